use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{ExportFormat, ObjectKind, RemoteObject};
use crate::drive::{RemoteStoreClient, Transfer};
use crate::error::BackupError;
use crate::fs_util;
use crate::layout::output_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    Directory {
        path: Utf8PathBuf,
    },
    Downloaded {
        path: Utf8PathBuf,
        bytes: u64,
    },
    Exported {
        path: Utf8PathBuf,
        format: ExportFormat,
        bytes: u64,
    },
    /// Neither a success nor a failure.
    Unsupported {
        mime_type: String,
    },
    Failed {
        path: Utf8PathBuf,
        reason: String,
    },
}

impl Materialized {
    pub fn succeeded(&self) -> bool {
        matches!(
            self,
            Materialized::Directory { .. }
                | Materialized::Downloaded { .. }
                | Materialized::Exported { .. }
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Materialized::Failed { .. })
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            Materialized::Directory { path }
            | Materialized::Downloaded { path, .. }
            | Materialized::Exported { path, .. }
            | Materialized::Failed { path, .. } => Some(path),
            Materialized::Unsupported { .. } => None,
        }
    }
}

/// Writes one remote object at its destination, picking download or export by kind.
pub struct Materializer<'a, C: RemoteStoreClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: RemoteStoreClient + ?Sized> Materializer<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Never fails: transfer and filesystem errors come back as [`Materialized::Failed`].
    pub fn materialize(&self, object: &RemoteObject, destination: &Utf8Path) -> Materialized {
        let path = output_path(destination, &object.kind);
        match self.try_materialize(object, &path) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(
                    object_id = %object.id,
                    name = %object.name,
                    kind = %object.kind.label(),
                    path = %path,
                    error = %err,
                    "materialization failed"
                );
                Materialized::Failed {
                    path,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn try_materialize(
        &self,
        object: &RemoteObject,
        path: &Utf8Path,
    ) -> Result<Materialized, BackupError> {
        match &object.kind {
            ObjectKind::Folder => {
                fs_util::ensure_dir(path)?;
                Ok(Materialized::Directory {
                    path: path.to_path_buf(),
                })
            }
            ObjectKind::NativeFile => {
                let mut transfer = self.client.download_chunked(&object.id)?;
                let content = drain_transfer(transfer.as_mut())?;
                fs_util::write_atomic(path, &content)?;
                Ok(Materialized::Downloaded {
                    path: path.to_path_buf(),
                    bytes: content.len() as u64,
                })
            }
            ObjectKind::ExportableDocument { export_format } => {
                let mut transfer = self.client.export_chunked(&object.id, *export_format)?;
                let content = drain_transfer(transfer.as_mut())?;
                fs_util::write_atomic(path, &content)?;
                Ok(Materialized::Exported {
                    path: path.to_path_buf(),
                    format: *export_format,
                    bytes: content.len() as u64,
                })
            }
            ObjectKind::Unsupported { mime_type } => {
                tracing::info!(
                    object_id = %object.id,
                    mime_type = %mime_type,
                    "skipping unsupported type"
                );
                Ok(Materialized::Unsupported {
                    mime_type: mime_type.clone(),
                })
            }
        }
    }
}

/// Pulls chunks until the transfer reports completion, buffering everything in memory.
pub fn drain_transfer<T: Transfer + ?Sized>(transfer: &mut T) -> Result<Vec<u8>, BackupError> {
    let mut buffer = Vec::new();
    loop {
        let chunk = transfer.next_chunk()?;
        buffer.extend_from_slice(&chunk.bytes);
        if chunk.done {
            return Ok(buffer);
        }
    }
}
