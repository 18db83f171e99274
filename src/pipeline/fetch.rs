//! Image download, upload, and temp-file lifecycle
//!
//! Transfers retry transient transport failures up to 3 attempts with
//! exponential backoff; validation failures never retry. The downloaded
//! input lives in a guard that removes the file on every exit path.

use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{LimitsConfig, StorageConfig};
use crate::error::{AppError, Result};
use crate::pipeline::probe;

const TRANSFER_ATTEMPTS: u32 = 3;

/// Local copy of a downloaded input image, deleted on drop
#[derive(Debug)]
pub struct TempImage {
    path: PathBuf,
}

impl TempImage {
    pub async fn create(dir: &Path, bytes: &[u8], extension: &str) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.{}", Uuid::new_v4(), extension));
        tokio::fs::write(&path, bytes).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Temp image cleanup failed");
            }
        }
    }
}

/// One transfer attempt's failure mode: transient failures are retried,
/// fatal ones surface immediately.
enum AttemptError {
    Transient(String),
    Fatal(AppError),
}

/// Downloads validated input images and uploads generated results
pub struct ImageFetcher {
    client: Client,
    limits: LimitsConfig,
    storage: StorageConfig,
    download_timeout: Duration,
    upload_timeout: Duration,
}

impl ImageFetcher {
    pub fn new(
        limits: LimitsConfig,
        storage: StorageConfig,
        download_timeout: Duration,
        upload_timeout: Duration,
    ) -> Result<Self> {
        // Timeouts are applied per request; the two directions are bounded
        // independently.
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limits,
            storage,
            download_timeout,
            upload_timeout,
        })
    }

    /// Check the image URL against the origin allow-list before any network
    /// traffic happens.
    pub fn validate_url(&self, raw: &str) -> Result<reqwest::Url> {
        let url = reqwest::Url::parse(raw)
            .map_err(|e| AppError::Validation(format!("Invalid image URL: {}", e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| AppError::Validation("Image URL has no host".to_string()))?;

        if !self
            .storage
            .allowed_image_hosts
            .iter()
            .any(|allowed| allowed == host)
        {
            return Err(AppError::Validation(format!(
                "Image URL host '{}' is not allowed",
                host
            )));
        }

        Ok(url)
    }

    /// Download the input image to a guarded temp file, enforcing the byte
    /// ceiling both from the declared length and while streaming, then
    /// verifying format and pixel dimensions.
    pub async fn download(&self, url: &reqwest::Url) -> Result<TempImage> {
        let bytes = self
            .with_retries("download", || self.try_download(url))
            .await?;

        let info = probe::probe(&bytes)?;
        let max_dim = self.limits.max_image_dimension;
        if info.width > max_dim || info.height > max_dim {
            return Err(AppError::Validation(format!(
                "Image dimensions too large: {}x{} (max: {}x{})",
                info.width, info.height, max_dim, max_dim
            )));
        }

        debug!(
            width = info.width,
            height = info.height,
            format = info.format.as_str(),
            size_bytes = bytes.len(),
            "Input image validated"
        );

        let dir = PathBuf::from(&self.storage.tmp_dir);
        TempImage::create(&dir, &bytes, info.format.as_str()).await
    }

    /// Upload a generated image, returning its public URL
    pub async fn upload(&self, image: &[u8]) -> Result<String> {
        let key = format!("{}/{}.jpg", self.storage.output_prefix, Uuid::new_v4());
        let target = format!("{}/{}", self.storage.output_base_url, key);

        self.with_retries("upload", || self.try_upload(&target, image))
            .await?;

        debug!(url = %target, size_bytes = image.len(), "Result uploaded");
        Ok(target)
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, AttemptError>>,
    {
        let mut last_err = String::new();
        let mut attempt = 0;
        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(e)) => last_err = e,
            }
            attempt += 1;
            if attempt >= TRANSFER_ATTEMPTS {
                return Err(AppError::Transfer(format!(
                    "{} failed after {} attempts: {}",
                    what, TRANSFER_ATTEMPTS, last_err
                )));
            }
            let backoff = 2u64.pow(attempt) * 100; // 200ms, 400ms
            debug!(what, attempt, backoff_ms = backoff, "Retrying transfer");
            sleep(Duration::from_millis(backoff)).await;
        }
    }

    async fn try_download(&self, url: &reqwest::Url) -> std::result::Result<Vec<u8>, AttemptError> {
        let max_bytes = self.limits.max_image_bytes();

        let response = self
            .client
            .get(url.clone())
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::Transient(format!("status {}", status)));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(AppError::Transfer(format!(
                "Image download returned status {}",
                status
            ))));
        }

        // Fail fast on a declared size over the ceiling
        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(AttemptError::Fatal(AppError::Validation(format!(
                    "Image too large: {:.2}MB (max: {}MB)",
                    len as f64 / 1024.0 / 1024.0,
                    self.limits.max_image_size_mb
                ))));
            }
        }

        // Count while streaming; the header can lie
        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AttemptError::Transient(e.to_string()))?;
            if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(AttemptError::Fatal(AppError::Validation(format!(
                    "Image exceeds {}MB limit during download",
                    self.limits.max_image_size_mb
                ))));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(bytes)
    }

    async fn try_upload(
        &self,
        target: &str,
        image: &[u8],
    ) -> std::result::Result<(), AttemptError> {
        let response = self
            .client
            .put(target)
            .timeout(self.upload_timeout)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::Transient(format!("status {}", status)));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(AppError::Transfer(format!(
                "Upload returned status {}",
                status
            ))));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimitsConfig, StorageConfig};

    fn fetcher() -> ImageFetcher {
        ImageFetcher::new(
            LimitsConfig::default(),
            StorageConfig::default(),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_validate_url_allows_configured_host() {
        let f = fetcher();
        assert!(f
            .validate_url("https://storage.googleapis.com/bucket/face.jpg")
            .is_ok());
    }

    #[test]
    fn test_validate_url_rejects_other_hosts() {
        let f = fetcher();
        let err = f.validate_url("https://evil.example.com/face.jpg").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_validate_url_rejects_non_http_scheme() {
        let f = fetcher();
        assert!(f.validate_url("ftp://storage.googleapis.com/x").is_err());
        assert!(f.validate_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_upload_timeout_is_independent_of_download() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("PUT"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let storage = StorageConfig {
            output_base_url: format!("{}/bucket", server.uri()),
            ..StorageConfig::default()
        };
        // A generous download timeout must not rescue a slow upload
        let f = ImageFetcher::new(
            LimitsConfig::default(),
            storage,
            Duration::from_secs(30),
            Duration::from_millis(100),
        )
        .unwrap();

        let err = f.upload(b"image bytes").await.unwrap_err();
        assert!(matches!(err, AppError::Transfer(_)));
    }

    #[tokio::test]
    async fn test_temp_image_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempImage::create(dir.path(), b"bytes", "jpeg").await.unwrap();
        let path = temp.path().to_path_buf();
        assert!(path.exists());
        drop(temp);
        assert!(!path.exists());
    }
}
