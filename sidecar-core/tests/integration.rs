//! End-to-end tests: download from a local HTTP responder, then run the
//! installed binary as a real process.
//!
//! The "service" binaries are shell scripts, so these tests are Unix-only.
//! Health is simulated by binding the service port from the test itself.

#![cfg(unix)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use sidecar_core::platform::GO_NAMING;
use sidecar_core::{
    DownloadStage, Error, LifecycleState, Platform, ProgressEvent, ProgressReporter,
    RetrievalServer, ServiceConfig, ServiceEventKind, ServiceHost, ServiceKind, ServicesConfig,
    StaticBundle, StopOutcome, TimeoutConfig,
};

const FAKE_SERVER: &[u8] = b"#!/bin/sh\necho \"config=$SIDECAR_CONFIG_PATH\"\nexec sleep 30\n";

fn release_tar_gz() -> Vec<u8> {
    release_tar_gz_with_payload(0)
}

/// Release archive with an extra uncompressed blob of `payload` bytes.
fn release_tar_gz_with_payload(payload: usize) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::none()));
    let mut add = |path: &str, data: &[u8], mode: u32| {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder.append_data(&mut header, path, data).unwrap();
    };
    add("go-rag-release/go-rag", FAKE_SERVER, 0o644);
    add("go-rag-release/static/index.html", b"<html></html>", 0o644);
    if payload > 0 {
        add("go-rag-release/data/blob.bin", &vec![7u8; payload], 0o644);
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Minimal HTTP/1.1 responder serving fixed bodies; anything else is a 404.
async fn serve(routes: HashMap<String, Vec<u8>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }

                let request = String::from_utf8_lossy(&request);
                let path = request.split_whitespace().nth(1).unwrap_or("/");
                let response = match routes.get(path) {
                    Some(body) => {
                        let mut response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        )
                        .into_bytes();
                        response.extend_from_slice(body);
                        response
                    }
                    None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_vec(),
                };
                let _ = stream.write_all(&response).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    addr
}

async fn release_server() -> String {
    release_server_with(release_tar_gz()).await
}

async fn release_server_with(archive: Vec<u8>) -> String {
    let artifact = GO_NAMING.artifact_name("go-rag", Platform::current());
    let routes = HashMap::from([(format!("/releases/{artifact}"), archive)]);
    let addr = serve(routes).await;
    format!("http://{addr}/releases/")
}

fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        stop: Duration::from_secs(5),
        health_wait: Duration::from_secs(5),
        health_interval: Duration::from_millis(50),
        probe: Duration::from_secs(1),
    }
}

fn retrieval_config(install: &Path, download_url: &str, port: u16) -> ServiceConfig {
    ServiceConfig {
        config_path: Some("/etc/sidecar-test".into()),
        ..ServiceConfig::retrieval()
            .with_enabled(true)
            .with_install_path(install)
            .with_download_url(download_url)
            .with_port(port)
    }
}

fn recording_reporter() -> (Arc<Mutex<Vec<ProgressEvent>>>, ProgressReporter) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let reporter = ProgressReporter::new(move |event| sink.lock().unwrap().push(event.clone()));
    (events, reporter)
}

#[tokio::test]
async fn download_installs_binary_and_reports_progress() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let install = dir.path().join("go-rag");
    let url = release_server().await;
    let server = RetrievalServer::retrieval(retrieval_config(&install, &url, 8000), fast_timeouts())
        .unwrap();
    let (events, reporter) = recording_reporter();

    let binary = server.download(&reporter).await.unwrap();

    assert_eq!(binary, install.join("go-rag"));
    assert!(server.is_installed());
    let mode = std::fs::metadata(&binary).unwrap().permissions().mode();
    assert_eq!(mode & 0o755, 0o755);
    assert_eq!(
        std::fs::read_to_string(install.join("static/index.html")).unwrap(),
        "<html></html>"
    );
    assert!(!install.join("go-rag-download.tar.gz").exists());

    let events = events.lock().unwrap();
    let stages: Vec<DownloadStage> = events.iter().map(|e| e.stage).collect();
    assert_eq!(stages.first(), Some(&DownloadStage::Preparing));
    assert_eq!(stages[1], DownloadStage::Connecting);
    assert!(stages.contains(&DownloadStage::Downloading));
    assert!(stages.contains(&DownloadStage::Extracting));
    let last = events.last().unwrap();
    assert!(last.is_complete());
    assert_eq!(last.percent, 100.0);
    assert!(
        events
            .windows(2)
            .all(|pair| pair[0].downloaded <= pair[1].downloaded)
    );
    let total = release_tar_gz().len() as u64;
    assert!(
        events
            .iter()
            .any(|e| e.stage == DownloadStage::Downloading && e.total == Some(total))
    );
}

#[tokio::test]
async fn download_rejects_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(HashMap::new()).await;
    let server = RetrievalServer::retrieval(
        retrieval_config(dir.path(), &format!("http://{addr}/releases"), 8000),
        fast_timeouts(),
    )
    .unwrap();

    let result = server.download(&ProgressReporter::silent()).await;

    let Err(Error::DownloadStatus { status, .. }) = result else {
        panic!("expected DownloadStatus");
    };
    assert!(status.contains("404"));
    assert!(!server.is_installed());
}

#[tokio::test]
async fn installed_service_runs_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let install = dir.path().join("go-rag");
    let health = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = health.local_addr().unwrap().port();
    let url = release_server().await;
    let server = RetrievalServer::retrieval(retrieval_config(&install, &url, port), fast_timeouts())
        .unwrap();
    server.download(&ProgressReporter::silent()).await.unwrap();
    assert_eq!(server.lifecycle_state().await, LifecycleState::Installed);

    let pid = server.start(&CancellationToken::new()).await.unwrap();
    assert!(server.is_running().await);
    assert_eq!(server.pid().await, Some(pid));
    assert!(matches!(
        server.start(&CancellationToken::new()).await,
        Err(Error::AlreadyRunning(_))
    ));

    server.wait_for_health().await.unwrap();
    let status = server.status().await;
    assert!(status.installed && status.running && status.healthy);

    assert_eq!(server.stop().await.unwrap(), StopOutcome::Exited);
    assert_eq!(server.lifecycle_state().await, LifecycleState::Stopped);
    assert!(!server.status().await.running);

    let log = std::fs::read_to_string(install.join("go-rag.log")).unwrap();
    assert!(log.contains("config=/etc/sidecar-test"));
}

#[tokio::test]
async fn late_subscriber_skips_lag_and_sees_completion() {
    use tokio::sync::broadcast::error::TryRecvError;

    let dir = tempfile::tempdir().unwrap();
    let install = dir.path().join("go-rag");
    // Well over 256 chunks of 32 KiB
    let url = release_server_with(release_tar_gz_with_payload(12 * 1024 * 1024)).await;

    let config = ServicesConfig {
        retrieval: retrieval_config(&install, &url, 8000),
        timeouts: fast_timeouts(),
        ..ServicesConfig::default()
    };
    let host = ServiceHost::new(config, Arc::new(StaticBundle::new())).unwrap();
    let mut events = host.subscribe();

    host.download(ServiceKind::Retrieval).await.unwrap();
    assert_eq!(
        std::fs::metadata(install.join("data/blob.bin")).unwrap().len(),
        12 * 1024 * 1024
    );

    let mut lagged = 0;
    let mut kinds = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => kinds.push(event.kind),
            Err(TryRecvError::Lagged(n)) => lagged += n,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    assert!(lagged > 0);
    assert_eq!(kinds.last(), Some(&ServiceEventKind::DownloadComplete));
    assert!(
        kinds
            .iter()
            .any(|kind| matches!(kind, ServiceEventKind::DownloadProgress { .. }))
    );
}

#[tokio::test]
async fn host_cancellation_stops_retrieval_server() {
    let dir = tempfile::tempdir().unwrap();
    let install = dir.path().join("go-rag");
    let health = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = health.local_addr().unwrap().port();
    let url = release_server().await;

    let config = ServicesConfig {
        retrieval: retrieval_config(&install, &url, port),
        timeouts: fast_timeouts(),
        ..ServicesConfig::default()
    };
    let cancel = CancellationToken::new();
    let host = ServiceHost::new(config, Arc::new(StaticBundle::new()))
        .unwrap()
        .with_cancellation(cancel.clone());
    let mut events = host.subscribe();

    host.download(ServiceKind::Retrieval).await.unwrap();
    let pid = host.start(ServiceKind::Retrieval).await.unwrap();
    assert!(host.status(ServiceKind::Retrieval).await.healthy);

    let mut saw_progress = false;
    let mut started_pid = None;
    while let Ok(event) = events.try_recv() {
        match event.kind {
            ServiceEventKind::DownloadProgress { .. } => saw_progress = true,
            ServiceEventKind::StartComplete { pid } => started_pid = Some(pid),
            _ => {}
        }
    }
    assert!(saw_progress);
    assert_eq!(started_pid, Some(pid));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), async {
        while host.status(ServiceKind::Retrieval).await.running {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(
        host.lifecycle_state(ServiceKind::Retrieval).await,
        Some(LifecycleState::Stopped)
    );
    host.shutdown().await;
}
