//! Read and replace a service's config file with backup/restore.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

fn file_error(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Error {
    let path = path.to_path_buf();
    move |source| Error::ConfigFile {
        action,
        path,
        source,
    }
}

/// Read the whole config file.
///
/// # Errors
///
/// Returns [`Error::ConfigFile`] if the file cannot be read.
pub fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(file_error("read", path))
}

/// Replace the config file, restoring the previous content if the write fails.
///
/// # Errors
///
/// Returns [`Error::ConfigFile`] if the backup or the write fails.
pub fn replace(path: &Path, content: &str) -> Result<()> {
    replace_with(path, content, |path, content| fs::write(path, content))
}

pub(crate) fn replace_with<W>(path: &Path, content: &str, write: W) -> Result<()>
where
    W: FnOnce(&Path, &str) -> io::Result<()>,
{
    let backup = backup_path(path);
    let had_original = path.exists();

    if had_original {
        fs::copy(path, &backup).map_err(file_error("back up", path))?;
        debug!(backup = %backup.display(), "Backed up config file");
    }

    if let Err(source) = write(path, content) {
        if had_original {
            match fs::rename(&backup, path) {
                Ok(()) => info!(path = %path.display(), "Restored config file from backup"),
                Err(e) => warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "Failed to restore config file from backup"
                ),
            }
        }
        return Err(Error::ConfigFile {
            action: "write",
            path: path.to_path_buf(),
            source,
        });
    }

    if had_original && let Err(e) = fs::remove_file(&backup) {
        warn!(backup = %backup.display(), error = %e, "Failed to remove config backup");
    }

    info!(path = %path.display(), "Config file saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn replace_overwrites_and_drops_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "old: true\n").unwrap();

        replace(&path, "new: true\n").unwrap();

        assert_eq!(read(&path).unwrap(), "new: true\n");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn failed_write_restores_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "port: 8000\n").unwrap();

        let result = replace_with(&path, "port: 9000\n", |path, _| {
            let mut file = fs::File::create(path)?;
            file.write_all(b"por")?;
            Err(io::Error::other("disk full"))
        });

        assert!(matches!(
            result,
            Err(Error::ConfigFile { action: "write", .. })
        ));
        assert_eq!(read(&path).unwrap(), "port: 8000\n");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn replace_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        replace(&path, "a: 1\n").unwrap();

        assert_eq!(read(&path).unwrap(), "a: 1\n");
    }

    #[test]
    fn read_missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");

        let err = read(&path).unwrap_err();
        assert!(err.to_string().contains("missing.yaml"));
    }
}
