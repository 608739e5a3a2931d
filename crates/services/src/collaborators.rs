//! Interfaces to the systems this crate drives but does not own: file storage,
//! the document-conversion worker, private media hosting and certificate rendering.

use std::collections::HashMap;
use std::env;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lms_core::model::{LessonId, NewCertificate};
use reqwest::Client;
use reqwest::header::RANGE;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollaboratorError {
    #[error("{0} is not configured")]
    Disabled(&'static str),
    #[error("resource not found: {0}")]
    Missing(String),
    #[error("byte range {start}..{end} is not satisfiable")]
    BadRange { start: u64, end: u64 },
    #[error("upstream returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Other(String),
}

/// Reference to a stored file, as handed back by the file store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef(pub String);

impl FileRef {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store raw bytes under a file name and return where they ended up.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError` if the bytes cannot be stored.
    async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<FileRef, CollaboratorError>;
}

#[async_trait]
pub trait ConversionQueue: Send + Sync {
    /// Hand a lesson's file to the conversion worker. The worker later reports back
    /// through `LessonService::record_conversion`.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError` if the job cannot be queued.
    async fn enqueue(&self, lesson: LessonId, file: &FileRef) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Read `range` (end exclusive) of a private media resource.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError` if the resource is missing or the range is invalid.
    async fn fetch_range(
        &self,
        resource_id: &str,
        range: Range<u64>,
    ) -> Result<Vec<u8>, CollaboratorError>;
}

#[async_trait]
pub trait CertificateRenderer: Send + Sync {
    /// Render a certificate document and return its public URL, if any.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError` if rendering fails.
    async fn render(&self, certificate: &NewCertificate) -> Result<Option<Url>, CollaboratorError>;
}

/// Every collaborator a full service stack needs.
#[derive(Clone)]
pub struct Collaborators {
    pub files: Arc<dyn FileStore>,
    pub conversions: Arc<dyn ConversionQueue>,
    pub media: Arc<dyn MediaSource>,
    pub certificates: Arc<dyn CertificateRenderer>,
}

impl Collaborators {
    /// In-process collaborators: files and media share one in-memory blob map,
    /// conversions are only recorded, certificates get no URL.
    #[must_use]
    pub fn in_memory() -> Self {
        let blobs = InMemoryFiles::default();
        Self {
            files: Arc::new(blobs.clone()),
            conversions: Arc::new(RecordingQueue::default()),
            media: Arc::new(blobs),
            certificates: Arc::new(NoCertificateUrl),
        }
    }
}

//
// ─── IN-PROCESS IMPLEMENTATIONS ────────────────────────────────────────────────
//

/// Blob map usable as both file store and media source.
#[derive(Clone, Default)]
pub struct InMemoryFiles {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryFiles {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, CollaboratorError> {
        self.blobs
            .lock()
            .map_err(|_| CollaboratorError::Other("file store lock poisoned".into()))
    }

    /// Put bytes at a fixed resource id, e.g. a lesson video.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::Other` if the lock is poisoned.
    pub fn insert(&self, resource_id: &str, bytes: Vec<u8>) -> Result<(), CollaboratorError> {
        self.lock()?.insert(resource_id.to_owned(), bytes);
        Ok(())
    }
}

#[async_trait]
impl FileStore for InMemoryFiles {
    async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<FileRef, CollaboratorError> {
        let mut blobs = self.lock()?;
        let key = format!("lesson_files/{}-{}", blobs.len() + 1, file_name.trim());
        blobs.insert(key.clone(), bytes.to_vec());
        Ok(FileRef(key))
    }
}

#[async_trait]
impl MediaSource for InMemoryFiles {
    async fn fetch_range(
        &self,
        resource_id: &str,
        range: Range<u64>,
    ) -> Result<Vec<u8>, CollaboratorError> {
        let blobs = self.lock()?;
        let bytes = blobs
            .get(resource_id)
            .ok_or_else(|| CollaboratorError::Missing(resource_id.to_owned()))?;
        let len = bytes.len() as u64;
        if range.start > range.end || range.start >= len {
            return Err(CollaboratorError::BadRange {
                start: range.start,
                end: range.end,
            });
        }
        let end = range.end.min(len);
        let start = usize::try_from(range.start).map_err(|_| CollaboratorError::BadRange {
            start: range.start,
            end: range.end,
        })?;
        let end = usize::try_from(end).map_err(|_| CollaboratorError::BadRange {
            start: range.start,
            end: range.end,
        })?;
        Ok(bytes[start..end].to_vec())
    }
}

/// Conversion queue that only remembers what it was given.
#[derive(Clone, Default)]
pub struct RecordingQueue {
    jobs: Arc<Mutex<Vec<(LessonId, FileRef)>>>,
}

impl RecordingQueue {
    #[must_use]
    pub fn jobs(&self) -> Vec<(LessonId, FileRef)> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ConversionQueue for RecordingQueue {
    async fn enqueue(&self, lesson: LessonId, file: &FileRef) -> Result<(), CollaboratorError> {
        self.jobs
            .lock()
            .map_err(|_| CollaboratorError::Other("conversion queue lock poisoned".into()))?
            .push((lesson, file.clone()));
        Ok(())
    }
}

/// Renderer for deployments without a certificate document service.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCertificateUrl;

#[async_trait]
impl CertificateRenderer for NoCertificateUrl {
    async fn render(&self, _certificate: &NewCertificate) -> Result<Option<Url>, CollaboratorError> {
        Ok(None)
    }
}

/// Certificates published under `{base}/{serial}.pdf`.
#[derive(Debug, Clone)]
pub struct UrlCertificateRenderer {
    base: Url,
}

impl UrlCertificateRenderer {
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

#[async_trait]
impl CertificateRenderer for UrlCertificateRenderer {
    async fn render(&self, certificate: &NewCertificate) -> Result<Option<Url>, CollaboratorError> {
        let mut base = self.base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(&format!("{}.pdf", certificate.serial))
            .map(Some)
            .map_err(|err| CollaboratorError::Other(err.to_string()))
    }
}

//
// ─── HTTP MEDIA PROXY ──────────────────────────────────────────────────────────
//

#[derive(Clone, Debug)]
pub struct HttpMediaConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl HttpMediaConfig {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("LMS_MEDIA_BASE_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let api_key = env::var("LMS_MEDIA_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        Some(Self { base_url, api_key })
    }
}

/// Proxies byte-range reads to a private object store over HTTP.
#[derive(Clone)]
pub struct HttpMediaSource {
    client: Client,
    config: Option<HttpMediaConfig>,
}

impl HttpMediaSource {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(HttpMediaConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<HttpMediaConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn fetch_range(
        &self,
        resource_id: &str,
        range: Range<u64>,
    ) -> Result<Vec<u8>, CollaboratorError> {
        let config = self
            .config
            .as_ref()
            .ok_or(CollaboratorError::Disabled("media source"))?;
        if range.start >= range.end {
            return Err(CollaboratorError::BadRange {
                start: range.start,
                end: range.end,
            });
        }

        let url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            resource_id.trim_start_matches('/')
        );
        let mut request = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={}-{}", range.start, range.end - 1));
        if let Some(key) = &config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Err(CollaboratorError::Missing(resource_id.into())),
            reqwest::StatusCode::RANGE_NOT_SATISFIABLE => Err(CollaboratorError::BadRange {
                start: range.start,
                end: range.end,
            }),
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            status => Err(CollaboratorError::HttpStatus(status)),
        }
    }
}
