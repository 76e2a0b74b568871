use crate::state::AppState;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use terra_core::prelude::*;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use url::Url;

/// An error leaving a handler. Clients get a status code, the instance and a
/// coarse error kind; the full error only goes to the logs.
pub struct ApiError {
    instance: Option<String>,
    error: anyhow::Error,
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            instance: None,
            error: err.into(),
        }
    }
}

impl ApiError {
    fn for_instance<E: Into<anyhow::Error>>(instance: &str) -> impl FnOnce(E) -> Self {
        move |err| Self {
            instance: Some(instance.to_string()),
            error: err.into(),
        }
    }
}

#[derive(Error, Debug)]
#[error("Manifest build timed out")]
pub struct ManifestTimeout;

#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    instance: Option<&'a str>,
    error: &'static str,
    message: &'static str,
}

fn manifest_status(err: &ManifestError) -> (StatusCode, &'static str, &'static str) {
    let kind = err.kind();
    let (status, message) = match kind {
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "Instance not found"),
        ErrorKind::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "Manifest build cancelled"),
        ErrorKind::AccessDenied => (StatusCode::INTERNAL_SERVER_ERROR, "Instance is not readable"),
        ErrorKind::InvalidEntry => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Instance contains an unsupported entry",
        ),
        ErrorKind::IoFailure => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read instance"),
    };
    (status, kind.as_str(), message)
}

fn classify(err: &anyhow::Error) -> (StatusCode, &'static str, &'static str) {
    if let Some(store_err) = err.downcast_ref::<StoreError>() {
        return match store_err {
            StoreError::InvalidName(_) => {
                (StatusCode::BAD_REQUEST, "invalid_name", "Invalid instance name")
            }
            StoreError::UnknownInstance(_) => {
                (StatusCode::NOT_FOUND, "not_found", "Instance not found")
            }
            StoreError::InvalidPath(_) => {
                (StatusCode::BAD_REQUEST, "invalid_path", "Invalid file path")
            }
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", "File not found"),
            StoreError::Manifest(manifest_err) => manifest_status(manifest_err),
            StoreError::Io(_) | StoreError::Generic(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_failure",
                "Storage failure",
            ),
        };
    }
    if let Some(manifest_err) = err.downcast_ref::<ManifestError>() {
        return manifest_status(manifest_err);
    }
    if err.downcast_ref::<ManifestTimeout>().is_some() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "timeout",
            "Manifest build timed out",
        );
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "Internal Server Error",
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = classify(&self.error);
        let instance = self.instance.as_deref().unwrap_or("-");
        if status.is_server_error() {
            error!("Request for instance {instance} failed: {:#}", self.error);
        } else {
            debug!("Request for instance {instance} rejected: {:#}", self.error);
        }

        let body = ErrorBody {
            instance: self.instance.as_deref(),
            error: code,
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// GET /instances
pub async fn list_instances<S: InstanceStore>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, ApiError> {
    let instances = state.store.list_instances().await?;
    Ok(Json(serde_json::json!({ "instances": instances })))
}

#[derive(Deserialize)]
pub struct ManifestParams {
    #[serde(default)]
    urls: bool,
}

/// A manifest entry with the link it can be downloaded from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEntry {
    #[serde(flatten)]
    pub entry: FileEntry,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadManifest {
    pub instance: String,
    pub algorithm: HashAlgorithm,
    pub files: Vec<DownloadEntry>,
}

/// GET /instances/{instance}/manifest
///
/// The walk is cancelled when the request is dropped or the configured
/// timeout elapses.
pub async fn get_manifest<S: InstanceStore>(
    State(state): State<AppState<S>>,
    Path(instance): Path<String>,
    Query(params): Query<ManifestParams>,
) -> Result<Response, ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let build = state.store.manifest(&instance, cancel);
    let manifest = match state.config.manifest_timeout {
        Some(limit) => tokio::time::timeout(limit, build)
            .await
            .map_err(|_| ApiError::for_instance(&instance)(ManifestTimeout))?,
        None => build.await,
    }
    .map_err(ApiError::for_instance(&instance))?;

    if !params.urls {
        return Ok(Json(manifest).into_response());
    }

    let Manifest {
        instance,
        algorithm,
        files,
    } = manifest;
    let files = files
        .into_iter()
        .map(|entry| {
            let url = download_url(&state.config.public_url, &instance, &entry.path)?;
            Ok(DownloadEntry {
                entry,
                url: url.into(),
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(Json(DownloadManifest {
        instance,
        algorithm,
        files,
    })
    .into_response())
}

fn download_url(base: &Url, instance: &str, path: &str) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Public url {base} cannot be a base"))?
        .pop_if_empty()
        .push("files")
        .push(instance)
        .extend(path.split('/'));
    Ok(url)
}

/// GET /files/{instance}/{*path}
pub async fn download_file<S: InstanceStore>(
    State(state): State<AppState<S>>,
    Path((instance, path)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let data = state
        .store
        .read_file(&instance, &path)
        .await
        .map_err(ApiError::for_instance(&instance))?;

    let mime_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();
    Ok(([(header::CONTENT_TYPE, mime_type)], data))
}

#[cfg(test)]
mod tests {
    use crate::{TerraServer, TerraServerConfig};
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use bytes::Bytes;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};
    use terra_core::prelude::*;
    use terra_fs::FileSystemInstances;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn write(root: &Path, path: &str, content: &[u8]) {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }

    fn test_router(config: TerraServerConfig) -> (TempDir, Router) {
        let dir = tempdir().unwrap();
        write(dir.path(), "survival/a.txt", b"hi");
        write(dir.path(), "survival/mods/x y.jar", b"bye");
        write(dir.path(), "survival/.DS_Store", b"junk");
        write(dir.path(), "creative/options.txt", b"fov:70");
        let app = TerraServer::new(config).build(FileSystemInstances::new(dir.path()));
        (dir, app)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, axum::body::Bytes) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = get(app, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health() {
        let (_dir, app) = test_router(TerraServerConfig::default());
        let (status, body) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn lists_instances() {
        let (_dir, app) = test_router(TerraServerConfig::default());
        let (status, json) = get_json(app, "/instances").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!({ "instances": ["creative", "survival"] })
        );
    }

    #[tokio::test]
    async fn serves_manifest() {
        let (_dir, app) = test_router(TerraServerConfig::default());
        let (status, json) = get_json(app, "/instances/survival/manifest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!({
                "instance": "survival",
                "algorithm": "sha1",
                "files": [
                    { "path": "a.txt", "hash": "c22b5f9178342609428d6f51b2c5af4c0bde6a42" },
                    { "path": "mods/x y.jar", "hash": "78c9a53e2f28b543ea62c8266acfdf36d5c63e61" },
                ]
            })
        );
    }

    #[tokio::test]
    async fn manifest_with_download_urls() {
        let config = TerraServerConfig {
            public_url: "https://cdn.example.com/terra/".parse().unwrap(),
            ..Default::default()
        };
        let (_dir, app) = test_router(config);
        let (status, json) = get_json(app, "/instances/survival/manifest?urls=true").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json["files"][0]["url"],
            "https://cdn.example.com/terra/files/survival/a.txt"
        );
        assert_eq!(
            json["files"][1]["url"],
            "https://cdn.example.com/terra/files/survival/mods/x%20y.jar"
        );
        assert_eq!(json["files"][1]["path"], "mods/x y.jar");
    }

    #[tokio::test]
    async fn unknown_instance_is_404_without_paths() {
        let (dir, app) = test_router(TerraServerConfig::default());
        let (status, body) = get(app, "/instances/missing/manifest").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["instance"], "missing");
        assert_eq!(json["error"], "not_found");
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains(dir.path().to_str().unwrap()));
    }

    #[tokio::test]
    async fn hidden_instance_name_is_rejected() {
        let (_dir, app) = test_router(TerraServerConfig::default());
        let (status, json) = get_json(app, "/instances/.git/manifest").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_name");
    }

    #[derive(Clone, Default)]
    struct StallingStore {
        seen: Arc<Mutex<Option<CancellationToken>>>,
    }

    impl InstanceStore for StallingStore {
        async fn list_instances(&self) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }

        async fn manifest(
            &self,
            _instance: &str,
            cancel: CancellationToken,
        ) -> Result<Manifest, StoreError> {
            *self.seen.lock().unwrap() = Some(cancel.clone());
            cancel.cancelled().await;
            Err(ManifestError::Cancelled.into())
        }

        async fn read_file(&self, _instance: &str, path: &str) -> Result<Bytes, StoreError> {
            Err(StoreError::NotFound(path.to_string()))
        }
    }

    #[tokio::test]
    async fn manifest_timeout_is_503_and_cancels_the_walk() {
        let store = StallingStore::default();
        let config = TerraServerConfig {
            manifest_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let app = TerraServer::new(config).build(store.clone());

        let (status, json) = get_json(app, "/instances/survival/manifest").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "timeout");
        assert_eq!(json["instance"], "survival");

        let seen = store.seen.lock().unwrap();
        assert!(seen.as_ref().unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn downloads_files() {
        let (_dir, app) = test_router(TerraServerConfig::default());
        let (status, body) = get(app.clone(), "/files/survival/mods/x%20y.jar").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"bye");

        let (status, json) = get_json(app.clone(), "/files/survival/nope.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "not_found");

        let (status, json) = get_json(app, "/files/survival/.DS_Store").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid_path");
    }
}
