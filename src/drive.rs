use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, HeaderMap, HeaderValue, RANGE, USER_AGENT};
use serde::Deserialize;

use crate::domain::{ExportFormat, ObjectId, ObjectKind, RemoteObject};
use crate::error::BackupError;

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, parents)";
const FILE_FIELDS: &str = "id, name, mimeType, parents";
const PAGE_SIZE: &str = "1000";
pub const CHUNK_SIZE: u64 = 16 * 1024 * 1024;

static CONTENT_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^bytes\s+(\d+)-(\d+)/(\d+|\*)$").expect("content-range pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    All,
    /// Exact match on the display name.
    Name(String),
}

#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<RemoteObject>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub bytes: Vec<u8>,
    pub done: bool,
}

/// A pending chunked download or export.
pub trait Transfer {
    fn next_chunk(&mut self) -> Result<Chunk, BackupError>;
}

pub trait RemoteStoreClient: Send + Sync {
    fn list_page(
        &self,
        filter: &ListFilter,
        page_token: Option<&str>,
    ) -> Result<ListPage, BackupError>;
    fn get_metadata(&self, id: &ObjectId) -> Result<RemoteObject, BackupError>;
    fn download_chunked(&self, id: &ObjectId) -> Result<Box<dyn Transfer + '_>, BackupError>;
    fn export_chunked(
        &self,
        id: &ObjectId,
        format: ExportFormat,
    ) -> Result<Box<dyn Transfer + '_>, BackupError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    parents: Vec<String>,
}

impl TryFrom<DriveFile> for RemoteObject {
    type Error = BackupError;

    fn try_from(file: DriveFile) -> Result<Self, Self::Error> {
        Ok(RemoteObject {
            id: file.id.parse()?,
            kind: ObjectKind::from_mime_type(&file.mime_type),
            name: file.name,
            parent_ids: file.parents.into_iter().map(ObjectId::new).collect(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutUser {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AboutResponse {
    user: AboutUser,
}

#[derive(Clone)]
pub struct DriveHttpClient {
    client: Client,
    base_url: String,
}

impl DriveHttpClient {
    pub fn new(access_token: &str) -> Result<Self, BackupError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gdrive-backup/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BackupError::DriveHttp(err.to_string()))?,
        );
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", access_token.trim()))
            .map_err(|_| {
                BackupError::AuthFailed("access token is not a valid header".to_string())
            })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| BackupError::DriveHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: DRIVE_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn about(&self) -> Result<AboutUser, BackupError> {
        let url = format!("{}/about", self.base_url);
        let response =
            self.send_with_retries(|| self.client.get(&url).query(&[("fields", "user")]))?;
        let response = Self::handle_status(response)?;
        let about: AboutResponse = response
            .json()
            .map_err(|err| BackupError::DriveHttp(err.to_string()))?;
        Ok(about.user)
    }

    fn handle_status(response: Response) -> Result<Response, BackupError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Drive request failed".to_string());
        Err(BackupError::DriveStatus { status, message })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, BackupError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 250;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        tracing::debug!(status, attempt, "retrying Drive request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        tracing::debug!(error = %err, attempt, "retrying Drive request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(BackupError::DriveHttp(err.to_string()));
                }
            }
        }
    }
}

impl RemoteStoreClient for DriveHttpClient {
    fn list_page(
        &self,
        filter: &ListFilter,
        page_token: Option<&str>,
    ) -> Result<ListPage, BackupError> {
        let url = format!("{}/files", self.base_url);
        let mut query = vec![
            ("pageSize", PAGE_SIZE.to_string()),
            ("fields", LIST_FIELDS.to_string()),
            ("includeItemsFromAllDrives", "true".to_string()),
            ("supportsAllDrives", "true".to_string()),
        ];
        if let ListFilter::Name(name) = filter {
            query.push(("q", name_query(name)));
            query.push(("spaces", "drive".to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let response = self.send_with_retries(|| self.client.get(&url).query(&query))?;
        let response = Self::handle_status(response)?;
        let body = response
            .text()
            .map_err(|err| BackupError::DriveHttp(err.to_string()))?;
        parse_file_list(&body)
    }

    fn get_metadata(&self, id: &ObjectId) -> Result<RemoteObject, BackupError> {
        let url = format!("{}/files/{}", self.base_url, id.as_str());
        let response = self.send_with_retries(|| {
            self.client
                .get(&url)
                .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
        })?;
        let response = Self::handle_status(response)?;
        let file: DriveFile = response
            .json()
            .map_err(|err| BackupError::DriveHttp(err.to_string()))?;
        RemoteObject::try_from(file)
    }

    fn download_chunked(&self, id: &ObjectId) -> Result<Box<dyn Transfer + '_>, BackupError> {
        Ok(Box::new(HttpTransfer::new(
            self,
            format!("{}/files/{}", self.base_url, id.as_str()),
            vec![
                ("alt".to_string(), "media".to_string()),
                ("supportsAllDrives".to_string(), "true".to_string()),
            ],
        )))
    }

    fn export_chunked(
        &self,
        id: &ObjectId,
        format: ExportFormat,
    ) -> Result<Box<dyn Transfer + '_>, BackupError> {
        Ok(Box::new(HttpTransfer::new(
            self,
            format!("{}/files/{}/export", self.base_url, id.as_str()),
            vec![("mimeType".to_string(), format.mime_type().to_string())],
        )))
    }
}

struct HttpTransfer<'a> {
    drive: &'a DriveHttpClient,
    url: String,
    query: Vec<(String, String)>,
    offset: u64,
    done: bool,
}

impl<'a> HttpTransfer<'a> {
    fn new(drive: &'a DriveHttpClient, url: String, query: Vec<(String, String)>) -> Self {
        Self {
            drive,
            url,
            query,
            offset: 0,
            done: false,
        }
    }
}

impl Transfer for HttpTransfer<'_> {
    fn next_chunk(&mut self) -> Result<Chunk, BackupError> {
        if self.done {
            return Ok(Chunk {
                bytes: Vec::new(),
                done: true,
            });
        }

        let range = format!("bytes={}-{}", self.offset, self.offset + CHUNK_SIZE - 1);
        let response = self.drive.send_with_retries(|| {
            self.drive
                .client
                .get(&self.url)
                .query(&self.query)
                .header(RANGE, &range)
        })?;

        // Empty media answers any range with 416.
        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            self.done = true;
            return Ok(Chunk {
                bytes: Vec::new(),
                done: true,
            });
        }

        let response = DriveHttpClient::handle_status(response)?;
        let status = response.status();
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range);
        let bytes = response
            .bytes()
            .map_err(|err| BackupError::Transfer(err.to_string()))?
            .to_vec();
        self.offset += bytes.len() as u64;

        let done = is_final_chunk(status, content_range, bytes.len() as u64);
        self.done = done;
        Ok(Chunk { bytes, done })
    }
}

/// Whether a ranged response ends the transfer.
///
/// Empty media answers any range with 416. A 206 is final once its range
/// reaches the declared total, or, with an unknown total, when it came back
/// short. Any other success status carried the whole body.
pub fn is_final_chunk(status: StatusCode, range: Option<ContentRange>, len: u64) -> bool {
    match (status, range) {
        (StatusCode::RANGE_NOT_SATISFIABLE, _) => true,
        (StatusCode::PARTIAL_CONTENT, Some(ContentRange { end, total: Some(total), .. })) => {
            end + 1 >= total
        }
        (StatusCode::PARTIAL_CONTENT, _) => len < CHUNK_SIZE,
        _ => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let captures = CONTENT_RANGE_RE.captures(value.trim())?;
    let start = captures.get(1)?.as_str().parse().ok()?;
    let end = captures.get(2)?.as_str().parse().ok()?;
    let total = match captures.get(3)?.as_str() {
        "*" => None,
        value => Some(value.parse().ok()?),
    };
    Some(ContentRange { start, end, total })
}

/// Builds the `q` expression for an exact name match.
pub fn name_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}'")
}

pub fn parse_file_list(body: &str) -> Result<ListPage, BackupError> {
    let response: FileListResponse =
        serde_json::from_str(body).map_err(|err| BackupError::RemoteList(err.to_string()))?;
    let objects = response
        .files
        .into_iter()
        .map(RemoteObject::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ListPage {
        objects,
        next_page_token: response.next_page_token.filter(|token| !token.is_empty()),
    })
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
