use std::fs;

use camino::Utf8Path;

use crate::domain::Subject;
use crate::drive::{DriveHttpClient, RemoteStoreClient};
use crate::error::BackupError;

pub const ACCESS_TOKEN_ENV: &str = "GDRIVE_ACCESS_TOKEN";

/// Establishes a session for `subject` and hands back a ready client.
pub trait Authenticator: Send + Sync {
    type Client: RemoteStoreClient;

    fn authenticate(&self, subject: &Subject) -> Result<Self::Client, BackupError>;
}

/// Uses an OAuth access token minted elsewhere (service account delegation, gcloud, ...).
#[derive(Clone)]
pub struct BearerTokenAuthenticator {
    token: String,
    base_url: Option<String>,
}

impl BearerTokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Result<Self, BackupError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(BackupError::MissingCredentials("access token".to_string()));
        }
        Ok(Self {
            token,
            base_url: None,
        })
    }

    /// Token from `token_file` when given, otherwise from `GDRIVE_ACCESS_TOKEN`.
    pub fn from_sources(token_file: Option<&Utf8Path>) -> Result<Self, BackupError> {
        match token_file {
            Some(path) => {
                let token = fs::read_to_string(path.as_std_path())
                    .map_err(|err| BackupError::Filesystem(format!("read token {path}: {err}")))?;
                Self::new(token)
            }
            None => match std::env::var(ACCESS_TOKEN_ENV) {
                Ok(token) => Self::new(token),
                Err(_) => Err(BackupError::MissingCredentials(format!(
                    "access token ({ACCESS_TOKEN_ENV})"
                ))),
            },
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

impl Authenticator for BearerTokenAuthenticator {
    type Client = DriveHttpClient;

    fn authenticate(&self, subject: &Subject) -> Result<Self::Client, BackupError> {
        let mut client = DriveHttpClient::new(&self.token)?;
        if let Some(base_url) = &self.base_url {
            client = client.with_base_url(base_url.clone());
        }
        let user = client.about().map_err(|err| match err {
            BackupError::DriveStatus { status, message } => {
                BackupError::AuthFailed(format!("status {status}: {message}"))
            }
            other => BackupError::AuthFailed(other.to_string()),
        })?;
        match user.email_address.as_deref() {
            Some(email) if !email.eq_ignore_ascii_case(subject.as_str()) => {
                tracing::warn!(
                    token_user = email,
                    subject = %subject,
                    "access token belongs to a different account than the subject"
                );
            }
            _ => {}
        }
        Ok(client)
    }
}
