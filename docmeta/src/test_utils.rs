//! Test utilities for integration testing (available with `test-utils` feature).

use crate::config::{Config, LoggingConfig, StorageConfig};
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use std::path::Path;
use tempfile::TempDir;

/// A running test server whose upload and log directories live in a temporary directory.
pub struct TestApp {
    pub server: TestServer,
    pub config: Config,
    /// Removed on drop, taking the uploads and logs with it
    pub dir: TempDir,
}

/// Configuration rooted at `root`: uploads in `root/uploads`, logs in `root/logs`.
pub fn create_test_config(root: &Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        storage: StorageConfig {
            upload_dir: root.join("uploads"),
            ..Default::default()
        },
        logging: LoggingConfig {
            log_dir: root.join("logs"),
            console: false,
            level: Some("info".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub async fn create_test_app() -> TestApp {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(dir.path());
    let server = create_test_app_with(config.clone()).await;

    TestApp { server, config, dir }
}

pub async fn create_test_app_with(config: Config) -> TestServer {
    crate::Application::new(config)
        .await
        .expect("Failed to create application")
        .into_test_server()
}

/// Multipart form with a single `file` part.
pub fn file_form(filename: &str, content: &[u8]) -> MultipartForm {
    let part = Part::bytes(content.to_vec())
        .file_name(filename)
        .mime_type("application/octet-stream");
    MultipartForm::new().add_part("file", part)
}

/// Contents of the service log file, empty if nothing has been written yet.
pub fn read_log(config: &Config) -> String {
    std::fs::read_to_string(config.logging.log_file()).unwrap_or_default()
}
