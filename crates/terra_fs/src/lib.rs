//! # Terra FileSystem Instances
//!
//! A local filesystem backend for Terra.
//!
//! This crate implements the [`InstanceStore`] trait over a directory whose
//! visible subdirectories are the instances.
//!
//! ## Features
//!
//! * **Name validation**: instance names can never point outside the root.
//! * **Blocking work off the runtime**: manifests are built on the blocking pool
//!   and stop early when the caller cancels.
//!
//! ## Usage
//!
//! ```no_run
//! use terra_fs::FileSystemInstances;
//!
//! let instances = FileSystemInstances::new("./instances");
//! ```

use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use terra_core::path::{is_hidden_name, split_relative};
use terra_core::prelude::*;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct FileSystemInstances {
    root: PathBuf,
    builder: ManifestBuilder,
}

impl FileSystemInstances {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            builder: ManifestBuilder::default(),
        }
    }

    pub fn with_manifest_config(mut self, config: ManifestConfig) -> Self {
        self.builder = ManifestBuilder::new(config);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).await?;
        info!("Serving instances from {}", self.root.display());
        Ok(())
    }

    /// Resolves `instance` to its directory.
    pub async fn instance_root(&self, instance: &str) -> Result<PathBuf, StoreError> {
        validate_name(instance)?;
        let path = self.root.join(instance);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            Ok(_) => Err(StoreError::UnknownInstance(instance.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::UnknownInstance(instance.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// Instance names are single, visible path segments.
pub fn validate_name(instance: &str) -> Result<(), StoreError> {
    let valid = !instance.is_empty()
        && !is_hidden_name(instance)
        && !instance.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(instance.to_string()))
    }
}

impl InstanceStore for FileSystemInstances {
    async fn list_instances(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if validate_name(&name).is_ok() => names.push(name),
                Ok(_) => {}
                Err(name) => debug!("Ignoring instance with non UTF-8 name {name:?}"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn manifest(
        &self,
        instance: &str,
        cancel: CancellationToken,
    ) -> Result<Manifest, StoreError> {
        let root = self.instance_root(instance).await?;
        let builder = self.builder.clone();
        let instance = instance.to_string();

        let manifest = tokio::task::spawn_blocking(move || {
            builder.build_with_cancel(&instance, &root, &cancel)
        })
        .await
        .map_err(|e| StoreError::Generic(format!("Manifest task failed: {e}")))??;

        Ok(manifest)
    }

    async fn read_file(&self, instance: &str, path: &str) -> Result<Bytes, StoreError> {
        let root = self.instance_root(instance).await?;
        let segments =
            split_relative(path).ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        let full = segments.iter().fold(root.clone(), |acc, s| acc.join(s));

        let not_found = || StoreError::NotFound(format!("{instance}/{path}"));
        let resolved = match fs::canonicalize(&full).await {
            Ok(resolved) => resolved,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(StoreError::Io(e)),
        };
        // Links may resolve outside of the instance.
        if !resolved.starts_with(fs::canonicalize(&root).await?) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        if !fs::metadata(&resolved).await?.is_file() {
            return Err(not_found());
        }

        Ok(Bytes::from(fs::read(&resolved).await?))
    }
}
