#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;

use gdrive_backup::app::{ProgressEvent, ProgressSink};
use gdrive_backup::auth::Authenticator;
use gdrive_backup::domain::{ExportFormat, ObjectId, ObjectKind, RemoteObject, Subject};
use gdrive_backup::drive::{Chunk, ListFilter, ListPage, RemoteStoreClient, Transfer};
use gdrive_backup::error::BackupError;

/// In-memory Drive: pages over `objects`, serves ancestors from `hidden`, and
/// returns each id's bytes in two chunks.
#[derive(Clone, Default)]
pub struct FakeDrive {
    pub objects: Vec<RemoteObject>,
    pub hidden: Vec<RemoteObject>,
    pub page_size: usize,
    pub contents: HashMap<String, Vec<u8>>,
    pub failing: HashSet<String>,
    pub broken_metadata: HashSet<String>,
    pub list_calls: Arc<Mutex<usize>>,
    pub metadata_calls: Arc<Mutex<usize>>,
    pub transfers: Arc<Mutex<Vec<String>>>,
    pub exports: Arc<Mutex<Vec<(String, ExportFormat)>>>,
}

impl FakeDrive {
    pub fn new(objects: Vec<RemoteObject>) -> Self {
        Self {
            objects,
            page_size: 2,
            ..Self::default()
        }
    }

    pub fn with_content(mut self, id: &str, content: &[u8]) -> Self {
        self.contents.insert(id.to_string(), content.to_vec());
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.lock().unwrap().len()
    }

    fn transfer(&self, id: &ObjectId) -> Result<Box<dyn Transfer + '_>, BackupError> {
        self.transfers.lock().unwrap().push(id.to_string());
        if self.failing.contains(id.as_str()) {
            return Err(BackupError::DriveStatus {
                status: 500,
                message: format!("backend error for {id}"),
            });
        }
        let content = self
            .contents
            .get(id.as_str())
            .cloned()
            .unwrap_or_else(|| format!("content of {id}").into_bytes());
        let split = content.len() / 2;
        Ok(Box::new(FakeTransfer {
            chunks: vec![content[..split].to_vec(), content[split..].to_vec()],
        }))
    }
}

impl RemoteStoreClient for FakeDrive {
    fn list_page(
        &self,
        filter: &ListFilter,
        page_token: Option<&str>,
    ) -> Result<ListPage, BackupError> {
        *self.list_calls.lock().unwrap() += 1;
        let matching = self
            .objects
            .iter()
            .filter(|object| match filter {
                ListFilter::All => true,
                ListFilter::Name(name) => &object.name == name,
            })
            .cloned()
            .collect::<Vec<_>>();
        let offset = page_token.map(|token| token.parse::<usize>().unwrap()).unwrap_or(0);
        let end = (offset + self.page_size).min(matching.len());
        Ok(ListPage {
            objects: matching[offset..end].to_vec(),
            next_page_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    fn get_metadata(&self, id: &ObjectId) -> Result<RemoteObject, BackupError> {
        *self.metadata_calls.lock().unwrap() += 1;
        if self.broken_metadata.contains(id.as_str()) {
            return Err(BackupError::DriveStatus {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        self.objects
            .iter()
            .chain(self.hidden.iter())
            .find(|object| &object.id == id)
            .cloned()
            .ok_or_else(|| BackupError::DriveStatus {
                status: 404,
                message: format!("File not found: {id}"),
            })
    }

    fn download_chunked(&self, id: &ObjectId) -> Result<Box<dyn Transfer + '_>, BackupError> {
        self.transfer(id)
    }

    fn export_chunked(
        &self,
        id: &ObjectId,
        format: ExportFormat,
    ) -> Result<Box<dyn Transfer + '_>, BackupError> {
        self.exports.lock().unwrap().push((id.to_string(), format));
        self.transfer(id)
    }
}

struct FakeTransfer {
    chunks: Vec<Vec<u8>>,
}

impl Transfer for FakeTransfer {
    fn next_chunk(&mut self) -> Result<Chunk, BackupError> {
        let bytes = if self.chunks.is_empty() {
            Vec::new()
        } else {
            self.chunks.remove(0)
        };
        Ok(Chunk {
            bytes,
            done: self.chunks.is_empty(),
        })
    }
}

pub struct FakeAuth {
    pub drive: FakeDrive,
    pub reject: bool,
}

impl FakeAuth {
    pub fn new(drive: FakeDrive) -> Self {
        Self {
            drive,
            reject: false,
        }
    }

    pub fn rejecting() -> Self {
        Self {
            drive: FakeDrive::default(),
            reject: true,
        }
    }
}

impl Authenticator for FakeAuth {
    type Client = FakeDrive;

    fn authenticate(&self, _subject: &Subject) -> Result<Self::Client, BackupError> {
        if self.reject {
            return Err(BackupError::AuthFailed("status 401: invalid credentials".to_string()));
        }
        Ok(self.drive.clone())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn folder(id: &str, name: &str) -> RemoteObject {
    RemoteObject::new(id, name, ObjectKind::Folder)
}

pub fn file(id: &str, name: &str) -> RemoteObject {
    RemoteObject::new(id, name, ObjectKind::NativeFile)
}

pub fn document(id: &str, name: &str, mime_type: &str) -> RemoteObject {
    RemoteObject::new(id, name, ObjectKind::from_mime_type(mime_type))
}

pub fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}
