use crate::AppState;
use crate::api::models::documents::UploadMetadata;
use crate::errors::{Error, ErrorBody, Result};
use crate::storage::PendingDocument;
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
};

/// Name of the multipart part carrying the document.
pub const FILE_FIELD: &str = "file";

#[utoipa::path(
    post,
    path = "/upload",
    tag = "documents",
    summary = "Upload document",
    description = "Store the `file` part of a multipart form under its original filename. \
                   An existing document with the same name is replaced.",
    request_body(
        content_type = "multipart/form-data",
        description = "Multipart form with a `file` part"
    ),
    responses(
        (status = 201, description = "Document stored", body = UploadMetadata),
        (status = 400, description = "No `file` part, or its filename is empty or unsafe", body = ErrorBody),
        (status = 413, description = "Payload too large", body = ErrorBody),
        (status = 500, description = "Document could not be written", body = ErrorBody)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn upload_document(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadMetadata>)> {
    // A body that is not multipart at all has no file part either
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!(error = %e, "Request is not multipart/form-data");
        Error::MissingFile
    })?;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| multipart_error(e, state.config.limits.max_upload_bytes))? {
        // Parts without a filename are plain form values, even when named `file`
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };

        if filename.is_empty() {
            return Err(Error::EmptyFilename);
        }
        let path = state.storage.resolve(&filename).ok_or_else(|| Error::UnsafeFilename { filename: filename.clone() })?;

        tracing::debug!(filename = %filename, path = %path.display(), "Storing document");

        let mut document = state.storage.create(path).await?;
        if let Err(e) = copy_field(&mut field, &mut document, state.config.limits.max_upload_bytes).await {
            document.discard().await;
            return Err(e);
        }
        let size_bytes = document.commit().await?;

        let metadata = UploadMetadata {
            filename,
            size_bytes,
            uploaded_at: state.clock.now(),
        };
        tracing::info!(
            filename = %metadata.filename,
            size_bytes = metadata.size_bytes,
            uploaded_at = %metadata.uploaded_at,
            "Document uploaded: {:?}",
            metadata
        );

        return Ok((StatusCode::CREATED, Json(metadata)));
    }

    Err(Error::MissingFile)
}

/// Stream a multipart field into `document`, enforcing the upload size limit as chunks arrive.
async fn copy_field(field: &mut Field<'_>, document: &mut PendingDocument, limit: u64) -> Result<()> {
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
        if document.bytes_written() + chunk.len() as u64 > limit {
            return Err(Error::PayloadTooLarge { limit });
        }
        document.write_chunk(&chunk).await?;
    }
    Ok(())
}

fn multipart_error(e: MultipartError, limit: u64) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {}", e.body_text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::models::documents::UploadMetadata;
    use crate::config::FilenamePolicy;
    use crate::test_utils::{TestApp, create_test_app, create_test_app_with, create_test_config, file_form, read_log};
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use chrono::NaiveDateTime;
    use serde_json::{Value, json};
    use std::path::Path;

    fn stored_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn upload_dir(app: &TestApp) -> &Path {
        &app.config.storage.upload_dir
    }

    #[tokio::test]
    async fn test_upload_stores_file_and_returns_metadata() {
        let app = create_test_app().await;
        let content = b"%PDF-1.7 quarterly numbers";

        let response = app.server.post("/upload").multipart(file_form("report.pdf", content)).await;

        response.assert_status(StatusCode::CREATED);
        let metadata: UploadMetadata = response.json();
        assert_eq!(metadata.filename, "report.pdf");
        assert_eq!(metadata.size_bytes, content.len() as u64);

        let stored = upload_dir(&app).join("report.pdf");
        assert_eq!(std::fs::read(&stored).unwrap(), content);
        assert_eq!(stored_files(upload_dir(&app)), vec!["report.pdf"]);
    }

    #[tokio::test]
    async fn test_upload_response_shape() {
        let app = create_test_app().await;

        let response = app.server.post("/upload").multipart(file_form("notes.txt", b"hi")).await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        let object = body.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(body["filename"], "notes.txt");
        assert_eq!(body["size_bytes"], 2);

        let uploaded_at = body["uploaded_at"].as_str().unwrap();
        assert!(NaiveDateTime::parse_from_str(uploaded_at, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
        assert_eq!(uploaded_at.len(), "2024-01-15T10:30:00.123456".len());
    }

    #[tokio::test]
    async fn test_upload_empty_file() {
        let app = create_test_app().await;

        let response = app.server.post("/upload").multipart(file_form("empty.txt", b"")).await;

        response.assert_status(StatusCode::CREATED);
        let metadata: UploadMetadata = response.json();
        assert_eq!(metadata.filename, "empty.txt");
        assert_eq!(metadata.size_bytes, 0);

        let stored = std::fs::metadata(upload_dir(&app).join("empty.txt")).unwrap();
        assert_eq!(stored.len(), 0);
    }

    #[tokio::test]
    async fn test_upload_binary_payload_verbatim() {
        let app = create_test_app().await;
        let content: Vec<u8> = (0..=255u8).cycle().take(300_000).collect();

        let response = app.server.post("/upload").multipart(file_form("blob.bin", &content)).await;

        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<UploadMetadata>().size_bytes, 300_000);
        assert_eq!(std::fs::read(upload_dir(&app).join("blob.bin")).unwrap(), content);
    }

    #[tokio::test]
    async fn test_missing_file_part() {
        let app = create_test_app().await;

        let response = app
            .server
            .post("/upload")
            .multipart(MultipartForm::new().add_text("description", "no file here"))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>(), json!({"error": "file is required"}));
        assert!(stored_files(upload_dir(&app)).is_empty());
    }

    #[tokio::test]
    async fn test_file_sent_as_text_field_is_missing() {
        let app = create_test_app().await;

        let response = app.server.post("/upload").multipart(MultipartForm::new().add_text("file", "not a file")).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>(), json!({"error": "file is required"}));
        assert!(stored_files(upload_dir(&app)).is_empty());
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_missing_file() {
        let app = create_test_app().await;

        let response = app.server.post("/upload").text("plain body").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>(), json!({"error": "file is required"}));

        let response = app.server.post("/upload").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>(), json!({"error": "file is required"}));

        assert!(stored_files(upload_dir(&app)).is_empty());
    }

    #[tokio::test]
    async fn test_empty_filename() {
        let app = create_test_app().await;

        let response = app.server.post("/upload").multipart(file_form("", b"orphaned bytes")).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>(), json!({"error": "filename missing"}));
        assert!(stored_files(upload_dir(&app)).is_empty());
    }

    #[tokio::test]
    async fn test_other_fields_are_ignored() {
        let app = create_test_app().await;

        let form = MultipartForm::new()
            .add_text("purpose", "archive")
            .add_part("attachment", Part::bytes(b"ignored".to_vec()).file_name("other.txt"))
            .add_part("file", Part::bytes(b"kept".to_vec()).file_name("kept.txt"));
        let response = app.server.post("/upload").multipart(form).await;

        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<UploadMetadata>().filename, "kept.txt");
        assert_eq!(stored_files(upload_dir(&app)), vec!["kept.txt"]);
    }

    #[tokio::test]
    async fn test_only_first_file_part_is_stored() {
        let app = create_test_app().await;

        let form = MultipartForm::new()
            .add_part("file", Part::bytes(b"first".to_vec()).file_name("first.txt"))
            .add_part("file", Part::bytes(b"second".to_vec()).file_name("second.txt"));
        let response = app.server.post("/upload").multipart(form).await;

        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<UploadMetadata>().filename, "first.txt");
        assert_eq!(stored_files(upload_dir(&app)), vec!["first.txt"]);
    }

    #[tokio::test]
    async fn test_text_file_value_before_file_part() {
        let app = create_test_app().await;

        let form = MultipartForm::new()
            .add_text("file", "just a label")
            .add_part("file", Part::bytes(b"real bytes".to_vec()).file_name("real.txt"));
        let response = app.server.post("/upload").multipart(form).await;

        response.assert_status(StatusCode::CREATED);
        let metadata: UploadMetadata = response.json();
        assert_eq!(metadata.filename, "real.txt");
        assert_eq!(metadata.size_bytes, 10);
        assert_eq!(stored_files(upload_dir(&app)), vec!["real.txt"]);
    }

    #[tokio::test]
    async fn test_concurrent_same_name_uploads_leave_one_payload() {
        let app = create_test_app().await;
        let payloads: Vec<Vec<u8>> = (b'a'..=b'd').map(|byte| vec![byte; 256 * 1024]).collect();

        let upload = |content: &[u8]| app.server.post("/upload").multipart(file_form("race.bin", content));
        let (r1, r2, r3, r4) = tokio::join!(
            async { upload(&payloads[0]).await },
            async { upload(&payloads[1]).await },
            async { upload(&payloads[2]).await },
            async { upload(&payloads[3]).await }
        );
        for response in [r1, r2, r3, r4] {
            response.assert_status(StatusCode::CREATED);
            assert_eq!(response.json::<UploadMetadata>().size_bytes, 256 * 1024);
        }

        let stored = std::fs::read(upload_dir(&app).join("race.bin")).unwrap();
        assert!(payloads.contains(&stored), "stored file mixes bytes from several uploads");
        // No staging files left behind
        assert_eq!(stored_files(upload_dir(&app)), vec!["race.bin"]);
    }

    #[tokio::test]
    async fn test_same_filename_overwrites() {
        let app = create_test_app().await;

        let first = app.server.post("/upload").multipart(file_form("report.pdf", b"content A, the longer one")).await;
        first.assert_status(StatusCode::CREATED);

        let second = app.server.post("/upload").multipart(file_form("report.pdf", b"content B")).await;
        second.assert_status(StatusCode::CREATED);
        assert_eq!(second.json::<UploadMetadata>().size_bytes, 9);

        assert_eq!(stored_files(upload_dir(&app)), vec!["report.pdf"]);
        assert_eq!(std::fs::read(upload_dir(&app).join("report.pdf")).unwrap(), b"content B");
    }

    #[tokio::test]
    async fn test_same_filename_overwrites_in_direct_mode() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = create_test_config(dir.path());
        config.storage.atomic_writes = false;
        let server = create_test_app_with(config.clone()).await;

        server.post("/upload").multipart(file_form("report.pdf", b"content A, the longer one")).await;
        server.post("/upload").multipart(file_form("report.pdf", b"content B")).await.assert_status(StatusCode::CREATED);

        assert_eq!(std::fs::read(config.storage.upload_dir.join("report.pdf")).unwrap(), b"content B");
    }

    #[tokio::test]
    async fn test_uploaded_at_non_decreasing() {
        let app = create_test_app().await;

        let mut previous: Option<NaiveDateTime> = None;
        for i in 0..5 {
            let response = app.server.post("/upload").multipart(file_form(&format!("doc-{i}.txt"), b"x")).await;
            let uploaded_at = response.json::<UploadMetadata>().uploaded_at;
            if let Some(previous) = previous {
                assert!(uploaded_at >= previous);
            }
            previous = Some(uploaded_at);
        }
    }

    #[tokio::test]
    async fn test_traversal_filename_rejected() {
        let app = create_test_app().await;

        for name in ["../escape.txt", "nested/inner.txt", "/etc/cron.d/job", ".."] {
            let response = app.server.post("/upload").multipart(file_form(name, b"payload")).await;

            response.assert_status(StatusCode::BAD_REQUEST);
            assert_eq!(response.json::<Value>(), json!({"error": "invalid filename"}));
        }

        assert!(stored_files(upload_dir(&app)).is_empty());
        assert!(!app.dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_verbatim_policy_joins_raw_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = create_test_config(dir.path());
        config.storage.filename_policy = FilenamePolicy::Verbatim;
        std::fs::create_dir_all(config.storage.upload_dir.join("nested")).unwrap();
        let server = create_test_app_with(config.clone()).await;

        let response = server.post("/upload").multipart(file_form("nested/inner.txt", b"deep")).await;

        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<UploadMetadata>().filename, "nested/inner.txt");
        assert_eq!(std::fs::read(config.storage.upload_dir.join("nested/inner.txt")).unwrap(), b"deep");
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = create_test_config(dir.path());
        config.limits.max_upload_bytes = 1024;
        let server = create_test_app_with(config.clone()).await;

        let response = server.post("/upload").multipart(file_form("big.bin", &[7u8; 4096])).await;
        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.json::<Value>(), json!({"error": "file too large"}));
        assert!(stored_files(&config.storage.upload_dir).is_empty());

        // Exactly at the limit is fine
        let response = server.post("/upload").multipart(file_form("fits.bin", &[7u8; 1024])).await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<UploadMetadata>().size_bytes, 1024);
    }

    #[tokio::test]
    async fn test_storage_failure_returns_structured_500() {
        let app = create_test_app().await;
        std::fs::remove_dir_all(upload_dir(&app)).unwrap();

        let response = app.server.post("/upload").multipart(file_form("lost.txt", b"nowhere to go")).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.json::<Value>(), json!({"error": "internal server error"}));
    }

    #[tokio::test]
    async fn test_each_outcome_logged_once() {
        let app = create_test_app().await;
        let _guard = tracing::subscriber::set_default(crate::telemetry::build_subscriber(&app.config.logging, false).unwrap());

        app.server.post("/upload").multipart(file_form("logged.txt", b"12345")).await.assert_status(StatusCode::CREATED);
        app.server.post("/upload").multipart(MultipartForm::new().add_text("x", "y")).await.assert_status(StatusCode::BAD_REQUEST);
        app.server.post("/upload").multipart(file_form("", b"z")).await.assert_status(StatusCode::BAD_REQUEST);

        let log = read_log(&app.config);
        let uploaded: Vec<&str> = log.lines().filter(|l| l.contains("Document uploaded")).collect();
        assert_eq!(uploaded.len(), 1);
        assert!(uploaded[0].contains(" INFO "));
        assert!(uploaded[0].contains("filename=logged.txt"));
        assert!(uploaded[0].contains("size_bytes=5"));

        let missing: Vec<&str> = log.lines().filter(|l| l.contains("No file part in request")).collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].contains("ERROR"));

        let empty: Vec<&str> = log.lines().filter(|l| l.contains("Empty filename received")).collect();
        assert_eq!(empty.len(), 1);
        assert!(empty[0].contains("ERROR"));
    }

    #[tokio::test]
    async fn test_storage_failure_logged_once() {
        let app = create_test_app().await;
        let _guard = tracing::subscriber::set_default(crate::telemetry::build_subscriber(&app.config.logging, false).unwrap());
        std::fs::remove_dir_all(upload_dir(&app)).unwrap();

        app.server
            .post("/upload")
            .multipart(file_form("lost.txt", b"nowhere to go"))
            .await
            .assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let log = read_log(&app.config);
        let errors: Vec<&str> = log.lines().filter(|l| l.contains("ERROR")).collect();
        assert_eq!(errors.len(), 1, "expected a single error line, got: {errors:#?}");
        assert!(errors[0].contains("Internal service error"));
        assert!(errors[0].contains("lost.txt"));
    }
}
