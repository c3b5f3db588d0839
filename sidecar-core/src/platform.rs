//! Platform-specific artifact naming.
//!
//! Upstream release artifacts use vendor naming for operating systems and
//! CPU architectures (Go's `darwin/amd64`, Rust target triples, ...) that
//! differs from the host's own names, so each service carries a mapping
//! table from host naming to its vendor naming.

use std::path::{Path, PathBuf};

/// Operating system and CPU architecture, in host (Rust) naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
}

impl Platform {
    /// The platform this process runs on.
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }

    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Archive extension used by release artifacts for this platform.
    #[must_use]
    pub fn archive_extension(&self) -> &'static str {
        if self.is_windows() { "zip" } else { "tar.gz" }
    }

    /// File name of an executable called `base`.
    #[must_use]
    pub fn executable_name(&self, base: &str) -> String {
        if self.is_windows() {
            format!("{base}.exe")
        } else {
            base.to_string()
        }
    }

    /// Path of the executable `base` inside `dir`.
    #[must_use]
    pub fn executable_path(&self, dir: &Path, base: &str) -> PathBuf {
        dir.join(self.executable_name(base))
    }
}

/// Order of the OS and architecture parts in an artifact name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactLayout {
    /// `{prefix}-{os}-{arch}.{ext}`
    OsArch,
    /// `{prefix}-{arch}-{os}.{ext}`
    ArchOs,
}

/// Mapping from host naming to a vendor's artifact naming.
///
/// Names missing from a table are passed through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct NamingTable {
    pub os: &'static [(&'static str, &'static str)],
    pub arch: &'static [(&'static str, &'static str)],
    pub layout: ArtifactLayout,
}

/// Go toolchain naming (`go-rag-linux-amd64.tar.gz`).
pub const GO_NAMING: NamingTable = NamingTable {
    os: &[("macos", "darwin")],
    arch: &[("x86_64", "amd64"), ("aarch64", "arm64"), ("x86", "386")],
    layout: ArtifactLayout::OsArch,
};

/// Rust target-triple naming (`qdrant-x86_64-unknown-linux-musl.tar.gz`).
pub const TARGET_TRIPLE_NAMING: NamingTable = NamingTable {
    os: &[
        ("macos", "apple-darwin"),
        ("linux", "unknown-linux-musl"),
        ("windows", "pc-windows-msvc"),
    ],
    arch: &[],
    layout: ArtifactLayout::ArchOs,
};

impl NamingTable {
    fn map(table: &[(&'static str, &'static str)], name: &'static str) -> &'static str {
        table
            .iter()
            .find(|(host, _)| *host == name)
            .map_or(name, |&(_, vendor)| vendor)
    }

    /// Artifact file name for `prefix` on `platform`.
    #[must_use]
    pub fn artifact_name(&self, prefix: &str, platform: Platform) -> String {
        let os = Self::map(self.os, platform.os);
        let arch = Self::map(self.arch, platform.arch);
        let ext = platform.archive_extension();
        match self.layout {
            ArtifactLayout::OsArch => format!("{prefix}-{os}-{arch}.{ext}"),
            ArtifactLayout::ArchOs => format!("{prefix}-{arch}-{os}.{ext}"),
        }
    }
}

/// Join a base URL and an artifact file name.
#[must_use]
pub fn artifact_url(base: &str, file_name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_X64: Platform = Platform {
        os: "linux",
        arch: "x86_64",
    };
    const MAC_ARM: Platform = Platform {
        os: "macos",
        arch: "aarch64",
    };
    const WIN_X64: Platform = Platform {
        os: "windows",
        arch: "x86_64",
    };

    #[test]
    fn go_naming_maps_os_and_arch() {
        assert_eq!(
            GO_NAMING.artifact_name("go-rag", LINUX_X64),
            "go-rag-linux-amd64.tar.gz"
        );
        assert_eq!(
            GO_NAMING.artifact_name("go-rag", MAC_ARM),
            "go-rag-darwin-arm64.tar.gz"
        );
        assert_eq!(
            GO_NAMING.artifact_name("go-rag", WIN_X64),
            "go-rag-windows-amd64.zip"
        );
    }

    #[test]
    fn target_triple_naming_puts_arch_first() {
        assert_eq!(
            TARGET_TRIPLE_NAMING.artifact_name("qdrant", LINUX_X64),
            "qdrant-x86_64-unknown-linux-musl.tar.gz"
        );
        assert_eq!(
            TARGET_TRIPLE_NAMING.artifact_name("qdrant", MAC_ARM),
            "qdrant-aarch64-apple-darwin.tar.gz"
        );
        assert_eq!(
            TARGET_TRIPLE_NAMING.artifact_name("qdrant", WIN_X64),
            "qdrant-x86_64-pc-windows-msvc.zip"
        );
    }

    #[test]
    fn unknown_names_pass_through() {
        let platform = Platform {
            os: "freebsd",
            arch: "riscv64",
        };
        assert_eq!(
            GO_NAMING.artifact_name("go-rag", platform),
            "go-rag-freebsd-riscv64.tar.gz"
        );
    }

    #[test]
    fn executable_name_adds_exe_on_windows() {
        assert_eq!(WIN_X64.executable_name("qdrant"), "qdrant.exe");
        assert_eq!(LINUX_X64.executable_name("qdrant"), "qdrant");
    }

    #[test]
    fn artifact_url_tolerates_trailing_slash() {
        assert_eq!(
            artifact_url("https://example.com/dl/", "a.tar.gz"),
            "https://example.com/dl/a.tar.gz"
        );
        assert_eq!(
            artifact_url("https://example.com/dl", "a.tar.gz"),
            "https://example.com/dl/a.tar.gz"
        );
    }
}
