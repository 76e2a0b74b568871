//! Path rules shared by the builder, the file server and the sync client.
//!
//! Manifest paths are relative, `/`-separated and never contain hidden
//! segments, whatever the host separator is.

use crate::error::ManifestError;
use std::ffi::OsStr;
use std::path::{Component, Path};

/// Manifest path of `path` relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> Result<String, ManifestError> {
    let stripped = path
        .strip_prefix(root)
        .map_err(|_| ManifestError::invalid(".", "outside of the instance root"))?;
    let display = || stripped.to_string_lossy().replace('\\', "/");

    let mut segments = Vec::new();
    for component in stripped.components() {
        match component {
            Component::Normal(name) => {
                let name = name
                    .to_str()
                    .ok_or_else(|| ManifestError::invalid(display(), "file name is not UTF-8"))?;
                segments.push(name);
            }
            Component::CurDir => {}
            _ => return Err(ManifestError::invalid(display(), "unexpected path component")),
        }
    }

    if segments.is_empty() {
        return Err(ManifestError::invalid(".", "entry is the instance root"));
    }
    Ok(segments.join("/"))
}

/// Splits a manifest path into its segments, or `None` if it could escape the
/// instance root or name something the manifest never lists.
pub fn split_relative(path: &str) -> Option<Vec<&str>> {
    if path.is_empty() || path.contains('\\') || path.contains('\0') {
        return None;
    }

    let segments: Vec<&str> = path.split('/').collect();
    let valid = segments
        .iter()
        .all(|segment| !segment.is_empty() && !is_hidden_name(segment));
    valid.then_some(segments)
}

/// Hidden names are skipped during traversal. This also covers `.` and `..`.
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// [`is_hidden_name`] for names that may not be UTF-8.
pub fn is_hidden_os_name(name: &OsStr) -> bool {
    name.as_encoded_bytes().starts_with(b".")
}
