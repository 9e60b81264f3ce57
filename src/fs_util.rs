use std::fs;
use std::io::{self, Write};

use camino::Utf8Path;

use crate::error::BackupError;

/// Creates `path` and its ancestors. Succeeds when another run already created it.
pub fn ensure_dir(path: &Utf8Path) -> Result<(), BackupError> {
    match fs::create_dir_all(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(err) => Err(BackupError::Filesystem(format!(
            "create directory {path}: {err}"
        ))),
    }
}

/// Writes `content` to a temp file beside `path`, then renames it into place.
pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), BackupError> {
    let parent = path
        .parent()
        .ok_or_else(|| BackupError::Filesystem(format!("invalid destination path {path}")))?;
    ensure_dir(parent)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".gdrive-backup")
        .suffix(".part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| BackupError::Filesystem(format!("create temp file in {parent}: {err}")))?;
    temp.write_all(content)
        .and_then(|()| temp.flush())
        .map_err(|err| BackupError::Filesystem(format!("write {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| BackupError::Filesystem(format!("persist {path}: {}", err.error)))?;
    Ok(())
}

/// Turns a display name into a single safe path component.
pub fn sanitize_component(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    match replaced.as_str() {
        "" | "." | ".." => format!("_{replaced}"),
        _ => replaced,
    }
}
