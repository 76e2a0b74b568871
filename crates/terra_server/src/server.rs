use crate::{api, state::AppState};
use axum::{Router, routing::get};
use std::sync::Arc;
use std::time::Duration;
use terra_core::prelude::*;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;
use url::Url;

/// The builder for the Terra Server.
#[derive(Clone, Debug, Default)]
pub struct TerraServer {
    config: TerraServerConfig,
}

impl TerraServer {
    pub fn new(config: TerraServerConfig) -> Self {
        Self { config }
    }
}

#[derive(Clone, Debug)]
pub struct TerraServerConfig {
    /// Base URL used for the download links of `?urls=true` manifests.
    ///
    /// Defaults to `http://localhost:3000/`.
    pub public_url: Url,
    /// Upper bound for building a single manifest. The walk is cancelled
    /// once it elapses.
    ///
    /// Defaults to 30 seconds.
    pub manifest_timeout: Option<Duration>,
    /// Answer cross-origin requests from any origin.
    ///
    /// Defaults to `true`.
    pub cors: bool,
}

const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000/";

impl Default for TerraServerConfig {
    fn default() -> Self {
        Self {
            public_url: Url::parse(DEFAULT_PUBLIC_URL).expect("default public url is valid"),
            manifest_timeout: Some(Duration::from_secs(30)),
            cors: true,
        }
    }
}

impl TerraServer {
    pub fn build<S: InstanceStore>(self, store: S) -> Router {
        let config = self.config;
        if config.public_url.cannot_be_a_base() {
            warn!(
                "Public url {} cannot be a base, download links will be unavailable",
                config.public_url
            );
        }
        let cors = config.cors;
        let state = AppState {
            store,
            config: Arc::new(config),
        };

        let router = Router::new()
            .route("/", get(|| async { "Terra File Server OK" }))
            .route("/health", get(|| async { "OK" }))
            .route("/instances", get(api::list_instances))
            .route("/instances/{instance}/manifest", get(api::get_manifest))
            .route("/files/{instance}/{*path}", get(api::download_file))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        if cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }
}
