//! Fallback-chain resolution of weight artifacts to local paths
//!
//! Candidates are tried in order: a missing artifact moves on to the next
//! location, a corrupt artifact aborts the whole resolution, and transient
//! transport failures are retried with exponential backoff before the
//! candidate is given up on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::resource::{Location, ResourceDescriptor};

const TRANSPORT_ATTEMPTS: u32 = 3;

/// Outcome of probing one candidate location
enum Probe {
    Found(PathBuf),
    Missing,
    Corrupt(String),
}

/// Resolves resource descriptors through their candidate chains
pub struct Resolver {
    client: Client,
    cache_dir: PathBuf,
}

impl Resolver {
    pub fn new(cache_dir: impl Into<PathBuf>, download_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            cache_dir: cache_dir.into(),
        })
    }

    /// Resolve a descriptor to a local artifact path.
    ///
    /// Fails with `ResourceUnavailable` when every candidate is exhausted or
    /// as soon as a candidate turns out to be present but corrupt.
    pub async fn resolve(&self, descriptor: &ResourceDescriptor) -> Result<PathBuf> {
        let mut last_failure: Option<String> = None;

        for location in &descriptor.candidates {
            let probe = match location {
                Location::Local(path) => self.probe_local(path).await,
                Location::Http(url) => match self.fetch_remote(descriptor, url).await {
                    Ok(probe) => probe,
                    Err(reason) => {
                        last_failure = Some(reason);
                        continue;
                    }
                },
            };

            match probe {
                Probe::Found(path) => {
                    debug!(resource = %descriptor.name, path = %path.display(), "Resolved artifact");
                    self.copy_to_cache(descriptor, &path).await;
                    return Ok(path);
                }
                Probe::Missing => {
                    debug!(resource = %descriptor.name, ?location, "Candidate not found, trying next");
                }
                Probe::Corrupt(reason) => {
                    // Corruption never falls through to a later candidate
                    warn!(resource = %descriptor.name, ?location, reason, "Corrupt artifact");
                    return Err(AppError::ResourceUnavailable(format!(
                        "Corrupt artifact for {}: {}",
                        descriptor.name, reason
                    )));
                }
            }
        }

        Err(AppError::ResourceUnavailable(format!(
            "No reachable location for {}{}",
            descriptor.name,
            last_failure
                .map(|e| format!(" (last error: {})", e))
                .unwrap_or_default()
        )))
    }

    async fn probe_local(&self, path: &Path) -> Probe {
        match tokio::fs::metadata(path).await {
            Err(_) => Probe::Missing,
            Ok(meta) if meta.is_dir() => match tokio::fs::read_dir(path).await {
                Ok(mut entries) => match entries.next_entry().await {
                    Ok(Some(_)) => Probe::Found(path.to_path_buf()),
                    Ok(None) => Probe::Corrupt("empty artifact directory".to_string()),
                    Err(e) => Probe::Corrupt(format!("unreadable artifact directory: {}", e)),
                },
                Err(e) => Probe::Corrupt(format!("unreadable artifact directory: {}", e)),
            },
            Ok(meta) => match verify_artifact_file(path, meta.len()).await {
                Ok(()) => Probe::Found(path.to_path_buf()),
                Err(reason) => Probe::Corrupt(reason),
            },
        }
    }

    /// Download a remote candidate into the fast cache. `Err` carries the
    /// transport failure after retries; not-found is a clean `Probe::Missing`.
    async fn fetch_remote(
        &self,
        descriptor: &ResourceDescriptor,
        url: &str,
    ) -> std::result::Result<Probe, String> {
        let target = descriptor
            .cache_path()
            .cloned()
            .unwrap_or_else(|| self.cache_dir.join(descriptor.name.replace('/', "-")));
        let staging = target.with_extension("partial");

        let mut last_err = String::new();
        let mut attempt = 0;
        loop {
            match self.try_download(url, &staging).await {
                Ok(Some(())) => break,
                Ok(None) => return Ok(Probe::Missing),
                Err(e) => last_err = e,
            }
            attempt += 1;
            if attempt >= TRANSPORT_ATTEMPTS {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(last_err);
            }
            let backoff = 2u64.pow(attempt) * 100; // 200ms, 400ms
            sleep(Duration::from_millis(backoff)).await;
        }

        let len = tokio::fs::metadata(&staging)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if let Err(reason) = verify_artifact_file(&staging, len).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Ok(Probe::Corrupt(reason));
        }

        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(format!("failed to place artifact into cache: {}", e));
        }
        info!(resource = %descriptor.name, url, path = %target.display(), "Fetched artifact");
        Ok(Probe::Found(target))
    }

    /// One download attempt. `Ok(None)` means the artifact does not exist at
    /// this location; `Err` is a transport failure eligible for retry.
    async fn try_download(
        &self,
        url: &str,
        staging: &Path,
    ) -> std::result::Result<Option<()>, String> {
        if let Some(parent) = staging.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("cache dir: {}", e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("{}: {}", url, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(format!("{}: status {}", url, response.status()));
        }

        let mut file = tokio::fs::File::create(staging)
            .await
            .map_err(|e| format!("create {}: {}", staging.display(), e))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| format!("{}: {}", url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write {}: {}", staging.display(), e))?;
        }
        file.flush()
            .await
            .map_err(|e| format!("flush {}: {}", staging.display(), e))?;
        Ok(Some(()))
    }

    /// Best-effort copy of a bulk-store hit into the fast cache
    async fn copy_to_cache(&self, descriptor: &ResourceDescriptor, resolved: &Path) {
        let Some(cache_path) = descriptor.cache_path() else {
            return;
        };
        if resolved == cache_path || resolved.is_dir() {
            return;
        }
        if tokio::fs::metadata(cache_path).await.is_ok() {
            return;
        }
        if let Some(parent) = cache_path.parent() {
            if tokio::fs::create_dir_all(parent).await.is_err() {
                return;
            }
        }
        match tokio::fs::copy(resolved, cache_path).await {
            Ok(_) => debug!(resource = %descriptor.name, cache = %cache_path.display(), "Cached artifact"),
            Err(e) => warn!(resource = %descriptor.name, error = %e, "Fast-cache copy failed"),
        }
    }
}

/// Sanity-check an artifact file. An empty file, or a safetensors file whose
/// header length does not fit inside the file, is corrupt rather than missing.
async fn verify_artifact_file(path: &Path, len: u64) -> std::result::Result<(), String> {
    if len == 0 {
        return Err("empty artifact file".to_string());
    }

    let is_safetensors = path
        .extension()
        .map(|e| e == "safetensors" || e == "partial")
        .unwrap_or(false);
    if !is_safetensors {
        return Ok(());
    }

    if len < 8 {
        return Err("truncated safetensors header".to_string());
    }
    // Weight files run to gigabytes; only the 8-byte header prefix is read
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| format!("unreadable artifact: {}", e))?;
    let mut header = [0u8; 8];
    file.read_exact(&mut header)
        .await
        .map_err(|e| format!("unreadable artifact: {}", e))?;
    let header_len = u64::from_le_bytes(header);
    if header_len == 0 || header_len.saturating_add(8) > len {
        return Err(format!(
            "safetensors header length {} exceeds file size {}",
            header_len, len
        ));
    }
    Ok(())
}
