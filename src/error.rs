use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BackupError {
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("no file names to search for")]
    #[diagnostic(help("pass names comma separated, e.g. --names \"Budget, Q3 Plan\""))]
    EmptyNameList,

    #[error("missing config file gdrive-backup.json in current directory")]
    #[diagnostic(help("pass --subject, or create gdrive-backup.json with a \"subject\" field"))]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("missing {0}")]
    #[diagnostic(help(
        "set GDRIVE_ACCESS_TOKEN, pass --access-token-file, or add it to gdrive-backup.json"
    ))]
    MissingCredentials(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("listing remote objects failed: {0}")]
    RemoteList(String),

    #[error("Drive request failed: {0}")]
    DriveHttp(String),

    #[error("Drive returned status {status}: {message}")]
    DriveStatus { status: u16, message: String },

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl BackupError {
    /// Errors raised by the remote store or its transport.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            BackupError::AuthFailed(_)
                | BackupError::RemoteList(_)
                | BackupError::DriveHttp(_)
                | BackupError::DriveStatus { .. }
                | BackupError::Transfer(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackupError::DriveStatus { status: 404, .. })
    }
}
