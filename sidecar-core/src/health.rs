//! Health probes and the polling combinator built on top of them.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::error::{Error, Result};

/// Check that something accepts TCP connections on `address`.
///
/// # Errors
///
/// Returns [`Error::Unhealthy`] if the connection is refused or does not
/// complete within `timeout`.
pub async fn probe_tcp(address: &str, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(Error::Unhealthy(format!("cannot connect to {address}: {e}"))),
        Err(_) => Err(Error::Unhealthy(format!(
            "connecting to {address} timed out after {timeout:?}"
        ))),
    }
}

/// Check that `url` answers a GET with status 200.
///
/// # Errors
///
/// Returns [`Error::Unhealthy`] on transport errors or any other status.
pub async fn probe_http(client: &reqwest::Client, url: &str) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Unhealthy(format!("GET {url}: {e}")))?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(Error::Unhealthy(format!(
            "{url} returned status: {}",
            response.status()
        )));
    }
    Ok(())
}

/// Poll `check` every `interval` until it succeeds or `timeout` elapses.
///
/// The first probe runs immediately. Holds no process state, so any manager
/// (or test) can use it with an arbitrary predicate.
///
/// # Errors
///
/// Returns [`Error::HealthTimeout`] if no probe succeeded in time, or
/// [`Error::Config`] for a zero `interval`.
pub async fn wait_for_health<F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if interval.is_zero() {
        return Err(Error::Config(format!(
            "health interval for {name} must be greater than zero"
        )));
    }

    let start = Instant::now();
    let poll = async {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;

        loop {
            ticker.tick().await;
            attempts += 1;
            match check().await {
                Ok(()) => return attempts,
                Err(e) => {
                    trace!(service = name, attempt = attempts, error = %e, "Health check failed, retrying...");
                    debug!(service = name, "Waiting for {} to become healthy...", name);
                }
            }
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(attempts) => {
            info!(
                service = name,
                attempts = attempts,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "{} is healthy",
                name
            );
            Ok(())
        }
        Err(_) => Err(Error::HealthTimeout {
            name: name.to_string(),
            timeout,
        }),
    }
}
