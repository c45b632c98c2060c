//! Host-side filesystem checks for paths that end up bind-mounted.
//!
//! Compose fails opaquely when a host path has the wrong type (a directory
//! where a file is mounted or the reverse). These helpers turn that into a
//! [`MountError`] before any container operation runs.

use crate::error::MountError;
use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Mode for generated files that have no existing permissions to keep.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Ensures `path` is a file, writing `content` only if it does not exist yet.
///
/// Returns `true` when the file was created by this call.
pub fn ensure_file(path: &Path, content: &str) -> Result<bool, MountError> {
    if path.is_dir() {
        return Err(MountError::ExpectedFile(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }
    if path.exists() {
        return Ok(false);
    }
    write_atomic_text_file(path, content, None).map_err(|err| MountError::io(path, err))?;
    debug!(path = %path.display(), "created file");
    Ok(true)
}

/// Ensures `path` is a directory, creating it and its parents as needed.
pub fn ensure_directory(path: &Path) -> Result<(), MountError> {
    if path.is_file() {
        return Err(MountError::ExpectedDirectory(path.to_path_buf()));
    }
    fs::create_dir_all(path).map_err(|err| MountError::io(path, err))
}

/// Copies `path` to `<name>.bak-<YYYYMMDD-HHMMSS>` next to it.
pub fn backup(path: &Path) -> Result<PathBuf, MountError> {
    if !path.is_file() {
        return Err(MountError::MissingBackupSource(path.to_path_buf()));
    }
    let target = backup_path(path, &Local::now().format("%Y%m%d-%H%M%S").to_string());
    fs::copy(path, &target).map_err(|err| MountError::io(&target, err))?;
    debug!(source = %path.display(), backup = %target.display(), "backed up file");
    Ok(target)
}

fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.bak-{stamp}"))
}

/// Writes `content` to a sibling temp file, then renames it over `path`.
///
/// On unix, `mode` is applied to the temp file before the rename.
pub fn write_atomic_text_file(path: &Path, content: &str, mode: Option<u32>) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let tmp_path = parent.join(format!(
        ".{}.tmp.{}.{}",
        path.file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "laradev".to_string()),
        std::process::id(),
        ts
    ));

    let written = fs::write(&tmp_path, content)
        .and_then(|_| apply_mode(&tmp_path, mode))
        .and_then(|_| fs::rename(&tmp_path, path));
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

/// Like [`write_atomic_text_file`], but keeps the permissions of an existing
/// file. `default_mode` applies when `path` does not exist yet.
pub fn write_atomic_text_file_preserving_mode(
    path: &Path,
    content: &str,
    default_mode: u32,
) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o7777)
            .unwrap_or(default_mode);
        write_atomic_text_file(path, content, Some(mode))
    }
    #[cfg(not(unix))]
    {
        let _ = default_mode;
        write_atomic_text_file(path, content, None)
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}
