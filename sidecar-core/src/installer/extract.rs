//! Archive extraction with one-level layout normalization.
//!
//! Release archives usually wrap everything in a single synthetic top-level
//! directory (`qdrant-x86_64/…`). Tar archives always have their first path
//! segment removed; zip archives only when every entry shares one root.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::{Error, Result};

/// Extract `archive` into `dest`, choosing the decoder from the file suffix.
///
/// # Errors
///
/// Returns [`Error::UnsupportedArchive`] for unknown suffixes and
/// [`Error::Extract`] for corrupt archives or entries that would escape `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive, dest)
    } else if name.ends_with(".zip") {
        extract_zip(archive, dest)
    } else {
        Err(Error::UnsupportedArchive(archive.to_path_buf()))
    }
}

/// Normalize an entry path to a relative path below the destination.
///
/// Drops `strip` leading segments. `Ok(None)` means nothing is left (the
/// entry is the stripped root itself); absolute paths and `..` are rejected.
fn relative_entry_path(path: &Path, strip: usize) -> std::result::Result<Option<PathBuf>, String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!("unsafe entry path: {}", path.display()));
            }
        }
    }

    if parts.len() <= strip {
        return Ok(None);
    }
    Ok(Some(parts[strip..].iter().collect()))
}

fn extract_error(archive: &Path, reason: impl ToString) -> Error {
    Error::Extract {
        path: archive.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

    for entry in tar.entries().map_err(|e| extract_error(archive, e))? {
        let mut entry = entry.map_err(|e| extract_error(archive, e))?;
        let path = entry
            .path()
            .map_err(|e| extract_error(archive, e))?
            .into_owned();

        let Some(relative) =
            relative_entry_path(&path, 1).map_err(|reason| extract_error(archive, reason))?
        else {
            continue;
        };
        let target = dest.join(&relative);
        let kind = entry.header().entry_type();

        if kind.is_dir() {
            fs::create_dir_all(&target)?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mode = entry.header().mode().unwrap_or(0o644);
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out).map_err(|e| extract_error(archive, e))?;
            set_mode(&target, mode)?;
        } else {
            debug!(entry = %path.display(), kind = ?kind, "Skipping non-regular tar entry");
        }
    }

    Ok(())
}

/// Whether every zip entry lives under one shared top-level directory.
fn zip_common_root<'a>(names: impl Iterator<Item = &'a str>) -> bool {
    let mut roots = HashSet::new();
    for name in names {
        let path = Path::new(name);
        let mut normal = path.components().filter(|c| matches!(c, Component::Normal(_)));
        let Some(first) = normal.next() else {
            continue;
        };
        if normal.next().is_none() && !name.ends_with('/') {
            return false;
        }
        roots.insert(first.as_os_str().to_owned());
    }
    roots.len() == 1
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))?;
    let strip = usize::from(zip_common_root(zip.file_names()));

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(name) = entry.enclosed_name() else {
            return Err(extract_error(
                archive,
                format!("unsafe entry path: {}", entry.name()),
            ));
        };
        let Some(relative) =
            relative_entry_path(&name, strip).map_err(|reason| extract_error(archive, reason))?
        else {
            continue;
        };
        let target = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out).map_err(|e| extract_error(archive, e))?;
        if let Some(mode) = entry.unix_mode() {
            set_mode(&target, mode)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
