use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BackupError;

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps.";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wraps an identifier handed out by the remote store without validation.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
        if !is_valid {
            return Err(BackupError::InvalidObjectId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    WordProcessing,
    Spreadsheet,
    Presentation,
    RasterImage,
}

impl ExportFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::WordProcessing => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Spreadsheet => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Presentation => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            ExportFormat::RasterImage => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::WordProcessing => "docx",
            ExportFormat::Spreadsheet => "xlsx",
            ExportFormat::Presentation => "pptx",
            ExportFormat::RasterImage => "png",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::WordProcessing => write!(f, "word-processing"),
            ExportFormat::Spreadsheet => write!(f, "spreadsheet"),
            ExportFormat::Presentation => write!(f, "presentation"),
            ExportFormat::RasterImage => write!(f, "raster-image"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    Folder,
    NativeFile,
    ExportableDocument { export_format: ExportFormat },
    /// A native document type with no export mapping (forms, sites, shortcuts, ...).
    Unsupported { mime_type: String },
}

impl ObjectKind {
    pub fn from_mime_type(mime_type: &str) -> Self {
        let export_format = match mime_type {
            FOLDER_MIME_TYPE => return ObjectKind::Folder,
            "application/vnd.google-apps.document" => ExportFormat::WordProcessing,
            "application/vnd.google-apps.spreadsheet" => ExportFormat::Spreadsheet,
            "application/vnd.google-apps.presentation" => ExportFormat::Presentation,
            "application/vnd.google-apps.drawing" => ExportFormat::RasterImage,
            other if other.starts_with(GOOGLE_APPS_PREFIX) => {
                return ObjectKind::Unsupported {
                    mime_type: other.to_string(),
                };
            }
            _ => return ObjectKind::NativeFile,
        };
        ObjectKind::ExportableDocument { export_format }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, ObjectKind::Folder)
    }

    pub fn label(&self) -> String {
        match self {
            ObjectKind::Folder => "folder".to_string(),
            ObjectKind::NativeFile => "file".to_string(),
            ObjectKind::ExportableDocument { export_format } => format!("{export_format} document"),
            ObjectKind::Unsupported { mime_type } => mime_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub id: ObjectId,
    pub name: String,
    pub kind: ObjectKind,
    pub parent_ids: Vec<ObjectId>,
}

impl RemoteObject {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            id: ObjectId::new(id),
            name: name.into(),
            kind,
            parent_ids: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_ids.push(ObjectId::new(parent));
        self
    }

    /// First listed parent; the one used to place the object in the backup tree.
    pub fn primary_parent(&self) -> Option<&ObjectId> {
        self.parent_ids.first()
    }
}

/// The account whose Drive is backed up, identified by email.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject(String);

impl Subject {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn dir_name(&self) -> String {
        self.0.replace('@', "_at_")
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Subject {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && !normalized.chars().any(|ch| ch.is_whitespace() || ch == '/' || ch == '\\')
            && normalized != "."
            && normalized != "..";
        if !is_valid {
            return Err(BackupError::InvalidSubject(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    Full,
    Targeted,
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupMode::Full => write!(f, "full"),
            BackupMode::Targeted => write!(f, "targeted"),
        }
    }
}

/// Splits a comma separated list of literal file names.
pub fn parse_name_list(input: &str) -> Result<Vec<String>, BackupError> {
    let names = input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if names.is_empty() {
        return Err(BackupError::EmptyNameList);
    }
    Ok(names)
}
