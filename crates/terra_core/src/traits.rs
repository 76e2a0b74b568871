use crate::error::*;
use crate::manifest::Manifest;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

/// Source of instances, usually a directory of directories.
pub trait InstanceStore: Send + Sync + 'static + Clone {
    /// Names of all instances, sorted.
    fn list_instances(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Builds a fresh manifest for `instance`. Implementations stop early once
    /// `cancel` fires.
    fn manifest(
        &self,
        instance: &str,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Manifest, StoreError>> + Send;

    /// Reads a file by its manifest path.
    fn read_file(
        &self,
        instance: &str,
        path: &str,
    ) -> impl Future<Output = Result<Bytes, StoreError>> + Send;
}
