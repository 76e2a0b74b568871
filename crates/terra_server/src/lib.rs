//! # Terra Server
//!
//! An axum router exposing a set of instances to launchers: instance listing,
//! manifests (optionally with download links) and raw file downloads.
//!
//! ## Usage
//!
//! ```no_run
//! use terra_fs::FileSystemInstances;
//! use terra_server::TerraServer;
//!
//! let app = TerraServer::default().build(FileSystemInstances::new("./instances"));
//! ```

mod api;
mod server;

pub mod state;

pub use api::{ApiError, DownloadEntry, DownloadManifest, ManifestTimeout};
pub use server::{TerraServer, TerraServerConfig};

pub mod prelude {
    pub use crate::server::*;
    pub use crate::state::*;
}
