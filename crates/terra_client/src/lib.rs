//! # Terra Client
//!
//! Talks to a Terra server: lists instances, fetches manifests, downloads files
//! and keeps a local copy of an instance in sync.
//!
//! ## Usage
//!
//! ```no_run
//! # async fn run() -> terra_client::Result<()> {
//! use terra_client::TerraClient;
//!
//! let client = TerraClient::new("http://localhost:3000")?;
//! let report = client.sync_instance("survival", "./survival".as_ref()).await?;
//! println!("{} files downloaded", report.downloaded.len());
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use terra_core::digest::hash_bytes;
use terra_core::path::split_relative;
use terra_core::prelude::*;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum TerraClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server returned error {0}: {1}")]
    ServerError(StatusCode, String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Local manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Integrity check failed for {path}. Expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },
}

pub type Result<T> = std::result::Result<T, TerraClientError>;

#[derive(Clone)]
pub struct TerraClient {
    base_url: Url,
    client: Client,
}

#[derive(Deserialize)]
struct InstanceList {
    instances: Vec<String>,
}

/// Outcome of [`TerraClient::sync_instance`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Paths written during the sync, in path order.
    pub downloaded: Vec<String>,
    pub up_to_date: usize,
    /// Local files the server does not list. They are left in place.
    pub extra: Vec<String>,
}

async fn atomic_write(path: &Path, data: Bytes) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| TerraClientError::Validation(format!("Invalid target {path:?}")))?;
    // Hidden, so an interrupted sync never shows up in a local manifest.
    let tmp_path = path.with_file_name(format!(".{file_name}.part"));

    fs::write(&tmp_path, data).await?;
    fs::rename(&tmp_path, path).await?;

    Ok(())
}

/// Checks a fetched manifest before anything is written to disk.
fn validate_remote(instance: &str, remote: &Manifest) -> Result<()> {
    if remote.instance != instance {
        return Err(TerraClientError::Validation(format!(
            "Requested instance {instance:?}, server sent {:?}",
            remote.instance
        )));
    }

    let hex_len = remote.algorithm.hex_len();
    for entry in &remote.files {
        if split_relative(&entry.path).is_none() {
            return Err(TerraClientError::Validation(format!(
                "Manifest lists invalid path {:?}",
                entry.path
            )));
        }
        if entry.hash.len() != hex_len || !entry.hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TerraClientError::Validation(format!(
                "Manifest lists invalid {} hash for {:?}",
                remote.algorithm, entry.path
            )));
        }
    }
    Ok(())
}

impl TerraClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TerraClientError::Validation(format!("Invalid server url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TerraClientError::Validation(format!(
                "Server url {base_url} cannot be a base"
            )));
        }

        Ok(Self {
            base_url,
            client: Client::new(),
        })
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(TerraClientError::ServerError(status, text));
        }

        Ok(response)
    }

    pub async fn list_instances(&self) -> Result<Vec<String>> {
        let response = self.get(self.endpoint(["instances"])).await?;

        let list: InstanceList = response.json().await.map_err(|e| {
            TerraClientError::Validation(format!("Failed to parse instance list: {e}"))
        })?;

        Ok(list.instances)
    }

    pub async fn fetch_manifest(&self, instance: &str) -> Result<Manifest> {
        let url = self.endpoint(["instances", instance, "manifest"]);
        let response = self.get(url).await?;

        let manifest: Manifest = response
            .json()
            .await
            .map_err(|e| TerraClientError::Validation(format!("Failed to parse manifest: {e}")))?;

        Ok(manifest)
    }

    pub async fn download_file(&self, instance: &str, path: &str) -> Result<Bytes> {
        let segments = split_relative(path)
            .ok_or_else(|| TerraClientError::Validation(format!("Invalid file path {path:?}")))?;
        let url = self.endpoint(["files", instance].into_iter().chain(segments));

        let response = self.get(url).await?;
        Ok(response.bytes().await?)
    }

    /// Brings `dir` up to date with the server's copy of `instance`.
    ///
    /// Missing and stale files are downloaded, verified against the manifest
    /// hash and written atomically. Files the server does not list are
    /// reported in [`SyncReport::extra`] and never deleted.
    pub async fn sync_instance(&self, instance: &str, dir: &Path) -> Result<SyncReport> {
        let remote = self.fetch_manifest(instance).await?;
        validate_remote(instance, &remote)?;

        fs::create_dir_all(dir).await?;
        let config = ManifestConfig {
            algorithm: remote.algorithm,
            symlinks: SymlinkPolicy::Skip,
            ..Default::default()
        };
        let local = {
            let name = instance.to_string();
            let dir = dir.to_path_buf();
            tokio::task::spawn_blocking(move || build_manifest(&name, &dir, config))
                .await
                .map_err(|e| TerraClientError::Validation(format!("Local scan failed: {e}")))??
        };

        let diff = remote.diff(&local);
        if diff.is_clean() {
            info!("Instance {instance} is already up to date");
        }
        debug!(
            "Instance {instance}: {} missing, {} stale, {} extra",
            diff.missing.len(),
            diff.stale.len(),
            diff.extra.len()
        );

        let mut report = SyncReport {
            downloaded: Vec::new(),
            up_to_date: diff.up_to_date,
            extra: diff.extra.clone(),
        };

        for entry in diff.to_download() {
            let data = self.download_file(instance, &entry.path).await?;
            let actual = hash_bytes(remote.algorithm, &data);
            if !actual.eq_ignore_ascii_case(&entry.hash) {
                return Err(TerraClientError::IntegrityMismatch {
                    path: entry.path.clone(),
                    expected: entry.hash.clone(),
                    actual,
                });
            }

            let target = entry.path.split('/').fold(dir.to_path_buf(), |acc, s| acc.join(s));
            atomic_write(&target, data).await?;
            debug!("Downloaded {}", entry.path);
            report.downloaded.push(entry.path.clone());
        }

        info!(
            "Synced instance {instance}: {} downloaded, {} up to date",
            report.downloaded.len(),
            report.up_to_date
        );
        Ok(report)
    }
}
