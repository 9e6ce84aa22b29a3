//! # docmeta: document upload service
//!
//! `docmeta` accepts documents over HTTP, stores them on local disk and reports their metadata.
//!
//! ## Overview
//!
//! A client posts a multipart form to `/upload` with the document in a part named `file`. The
//! payload is streamed to `<upload_dir>/<filename>`, using the filename exactly as the client sent
//! it, and the response carries `{filename, size_bytes, uploaded_at}`. `/status` is a liveness
//! probe. There is no database: the upload directory is the only state, and the metadata exists
//! only in the response and the service log.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). Each request runs as its own tokio
//! task; nothing is locked between requests.
//!
//! - The **API layer** ([`api`]) holds the route handlers and response models.
//! - The **storage layer** ([`storage`]) maps filenames to paths and performs the writes, either
//!   directly or through a staging file renamed into place.
//! - **Errors** ([`errors`]) convert to `{"error": ...}` JSON responses and are logged once, where
//!   the response is produced.
//! - **Telemetry** ([`telemetry`]) writes the service log file and optionally exports spans.
//!
//! ## Known limitations
//!
//! - Uploading a name that already exists replaces the stored document. Concurrent uploads of one
//!   name race: the last one to finish wins.
//! - With `storage.filename_policy: verbatim` the client-supplied name is joined to the upload
//!   directory unchecked, so `../` sequences escape it. The default `strict` policy rejects such
//!   names.
//! - A `201` response means the bytes reached the OS, not that they were fsynced.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use docmeta::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = docmeta::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     docmeta::telemetry::init_telemetry(&config.logging, config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod clock;
pub mod config;
pub mod errors;
mod openapi;
pub mod storage;
pub mod telemetry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use crate::{clock::UploadClock, openapi::ApiDoc, storage::LocalStorage};
use axum::{Json, Router, extract::DefaultBodyLimit, routing::get, routing::post};
use bon::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use utoipa::OpenApi;

pub use config::Config;

/// Allowance on top of `limits.max_upload_bytes` for multipart boundaries, headers and other
/// form fields. The exact limit on file bytes is enforced by the upload handler.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .storage(Arc::new(storage))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub storage: Arc<LocalStorage>,
    #[builder(default)]
    pub clock: Arc<UploadClock>,
}

/// Build the application router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.limits.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route(
            "/upload",
            post(api::handlers::documents::upload_document).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/status", get(api::handlers::status::get_status))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG))
                // Failed requests are already logged where the error response is built
                .on_failure(DefaultOnFailure::new().level(Level::DEBUG)),
        )
}

/// Main application struct that owns the router and configuration.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] ensures the upload directory exists and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting document service with configuration: {:#?}", config);

        let storage = LocalStorage::new(&config.storage);
        storage.ensure_root().await?;
        tokio::fs::create_dir_all(&config.logging.log_dir).await?;

        let state = AppState::builder()
            .config(config.clone())
            .storage(Arc::new(storage))
            .build();

        Ok(Self {
            router: build_router(state),
            config,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            upload_dir = %self.config.storage.upload_dir.display(),
            "Document service listening on http://{}",
            listener.local_addr()?
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
