use crate::digest::HashAlgorithm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The "Manifest" is a snapshot of an instance's files at request time.
/// Entries are sorted by path, every path appears once, directories never do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// The instance name, e.g. "survival-1.20".
    pub instance: String,

    /// The digest used for every `hash` below.
    #[serde(default)]
    pub algorithm: HashAlgorithm,

    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Relative path with `/` separators e.g., "mods/x.jar"
    pub path: String,

    /// Lower-case hex digest of the whole file.
    pub hash: String,

    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// What a client has to do to turn its local copy into the remote one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// Listed remotely, absent locally.
    pub missing: Vec<FileEntry>,
    /// Present on both sides with different content.
    pub stale: Vec<FileEntry>,
    /// Present locally only.
    pub extra: Vec<String>,
    pub up_to_date: usize,
}

impl ManifestDiff {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.stale.is_empty()
    }

    /// Remote entries that need to be downloaded, in path order.
    pub fn to_download(&self) -> Vec<&FileEntry> {
        let mut entries: Vec<&FileEntry> = self.missing.iter().chain(&self.stale).collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }
}

impl Manifest {
    /// Compares `self` (the remote side) against a `local` manifest.
    pub fn diff(&self, local: &Manifest) -> ManifestDiff {
        let local_files: BTreeMap<&str, &FileEntry> = local
            .files
            .iter()
            .map(|entry| (entry.path.as_str(), entry))
            .collect();

        let mut diff = ManifestDiff::default();
        for entry in &self.files {
            match local_files.get(entry.path.as_str()) {
                None => diff.missing.push(entry.clone()),
                Some(local) if !local.hash.eq_ignore_ascii_case(&entry.hash) => {
                    diff.stale.push(entry.clone())
                }
                Some(_) => diff.up_to_date += 1,
            }
        }

        let remote_paths: BTreeSet<&str> = self.files.iter().map(|e| e.path.as_str()).collect();
        diff.extra = local_files
            .keys()
            .filter(|path| !remote_paths.contains(*path))
            .map(|path| path.to_string())
            .collect();
        diff
    }
}
