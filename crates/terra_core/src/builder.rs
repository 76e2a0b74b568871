//! The manifest builder.
//!
//! Walks an instance root depth-first, skipping hidden entries, and hashes
//! every regular file it finds. Any failure aborts the whole build; a partial
//! manifest would make clients delete or re-download the wrong files.
//!
//! Files are not locked while being hashed, so a concurrent writer can leave a
//! hash that matches neither the old nor the new content.

use crate::digest::{HashAlgorithm, hash_reader};
use crate::error::ManifestError;
use crate::manifest::{FileEntry, Manifest};
use crate::path::{is_hidden_os_name, relative_path};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// What to do with symbolic links found under an instance root.
///
/// Links are never followed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SymlinkPolicy {
    /// Fail the build with [`ManifestError::InvalidEntry`].
    #[default]
    Reject,
    /// Leave the link out of the manifest.
    Skip,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestConfig {
    /// Defaults to SHA-1.
    pub algorithm: HashAlgorithm,
    /// Report each file's size in bytes.
    pub include_size: bool,
    /// Report each file's last modification time.
    pub include_modified: bool,
    pub symlinks: SymlinkPolicy,
}

#[derive(Debug, Clone, Default)]
pub struct ManifestBuilder {
    config: ManifestConfig,
}

impl ManifestBuilder {
    pub fn new(config: ManifestConfig) -> Self {
        Self { config }
    }

    pub fn build(&self, instance: &str, root: &Path) -> Result<Manifest, ManifestError> {
        self.build_with_cancel(instance, root, &CancellationToken::new())
    }

    /// Like [`build`](Self::build), but gives up with
    /// [`ManifestError::Cancelled`] once `cancel` fires. The token is checked
    /// between entries.
    pub fn build_with_cancel(
        &self,
        instance: &str,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<Manifest, ManifestError> {
        let metadata = fs::metadata(root).map_err(|e| ManifestError::from_io(".", e))?;
        if !metadata.is_dir() {
            return Err(ManifestError::invalid(".", "instance root is not a directory"));
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        let mut files = Vec::new();
        for entry in walker {
            if cancel.is_cancelled() {
                return Err(ManifestError::Cancelled);
            }

            let entry = entry.map_err(|e| walk_error(root, e))?;
            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let path = relative_path(root, entry.path())?;
            if file_type.is_symlink() {
                match self.config.symlinks {
                    SymlinkPolicy::Reject => {
                        return Err(ManifestError::invalid(path, "symbolic link"));
                    }
                    SymlinkPolicy::Skip => {
                        debug!("Skipping symbolic link {path} in instance {instance}");
                        continue;
                    }
                }
            }
            if !file_type.is_file() {
                return Err(ManifestError::invalid(path, "not a regular file"));
            }

            files.push(self.file_entry(entry.path(), path)?);
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        info!(
            "Built manifest for instance {instance}: {} files ({})",
            files.len(),
            self.config.algorithm
        );

        Ok(Manifest {
            instance: instance.to_string(),
            algorithm: self.config.algorithm,
            files,
        })
    }

    fn file_entry(&self, absolute: &Path, path: String) -> Result<FileEntry, ManifestError> {
        let file = File::open(absolute).map_err(|e| ManifestError::from_io(path.as_str(), e))?;
        let metadata = file
            .metadata()
            .map_err(|e| ManifestError::from_io(path.as_str(), e))?;

        let hash = hash_reader(self.config.algorithm, file)
            .map_err(|e| ManifestError::from_io(path.as_str(), e))?;

        let size = self.config.include_size.then(|| metadata.len());
        let modified = if self.config.include_modified {
            let time = metadata
                .modified()
                .map_err(|e| ManifestError::from_io(path.as_str(), e))?;
            Some(DateTime::<Utc>::from(time))
        } else {
            None
        };

        Ok(FileEntry {
            path,
            hash,
            size,
            modified,
        })
    }
}

/// Shorthand for `ManifestBuilder::new(config).build(instance, root)`.
pub fn build_manifest(
    instance: &str,
    root: &Path,
    config: ManifestConfig,
) -> Result<Manifest, ManifestError> {
    ManifestBuilder::new(config).build(instance, root)
}

fn is_hidden(entry: &DirEntry) -> bool {
    is_hidden_os_name(entry.file_name())
}

fn walk_error(root: &Path, err: walkdir::Error) -> ManifestError {
    let path = err
        .path()
        .and_then(|p| relative_path(root, p).ok())
        .unwrap_or_else(|| ".".to_string());
    match err.into_io_error() {
        Some(source) => ManifestError::from_io(path, source),
        None => ManifestError::invalid(path, "filesystem loop"),
    }
}
