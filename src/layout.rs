use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use directories::BaseDirs;

use crate::domain::{ObjectKind, Subject};
use crate::error::BackupError;
use crate::fs_util;

pub const SPECIFIC_FILES_DIR: &str = "specific_files";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStamp {
    Dated(NaiveDate),
    SpecificFiles,
}

impl RunStamp {
    pub fn today() -> Self {
        RunStamp::Dated(chrono::Local::now().date_naive())
    }
}

impl fmt::Display for RunStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStamp::Dated(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            RunStamp::SpecificFiles => write!(f, "{SPECIFIC_FILES_DIR}"),
        }
    }
}

/// Local destination tree: `<backup_root>/<subject>/<stamp>/<relative path>`.
#[derive(Debug, Clone)]
pub struct BackupLayout {
    backup_root: Utf8PathBuf,
}

impl BackupLayout {
    pub fn new(backup_root: Utf8PathBuf) -> Self {
        Self { backup_root }
    }

    pub fn default_root() -> Result<Utf8PathBuf, BackupError> {
        BaseDirs::new()
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().join("DriveBackups")).ok())
            .ok_or_else(|| BackupError::Filesystem("unable to resolve home directory".to_string()))
    }

    pub fn backup_root(&self) -> &Utf8Path {
        &self.backup_root
    }

    pub fn subject_dir(&self, subject: &Subject) -> Utf8PathBuf {
        self.backup_root.join(subject.dir_name())
    }

    pub fn run_root(&self, subject: &Subject, stamp: RunStamp) -> Utf8PathBuf {
        self.subject_dir(subject).join(stamp.to_string())
    }

    pub fn ensure_run_root(
        &self,
        subject: &Subject,
        stamp: RunStamp,
    ) -> Result<Utf8PathBuf, BackupError> {
        let root = self.run_root(subject, stamp);
        fs_util::ensure_dir(&root)?;
        Ok(root)
    }

    pub fn manifest_path(run_root: &Utf8Path) -> Utf8PathBuf {
        run_root.join(MANIFEST_FILE)
    }
}

/// Final on-disk path for an object, with the export suffix appended where one applies.
pub fn output_path(destination: &Utf8Path, kind: &ObjectKind) -> Utf8PathBuf {
    match kind {
        ObjectKind::ExportableDocument { export_format } => {
            Utf8PathBuf::from(format!("{destination}.{}", export_format.extension()))
        }
        ObjectKind::Folder | ObjectKind::NativeFile | ObjectKind::Unsupported { .. } => {
            destination.to_path_buf()
        }
    }
}
