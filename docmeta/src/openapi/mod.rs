//! OpenAPI documentation for the service, served at `/api-docs/openapi.json`.

use crate::api::handlers::{documents, status};
use crate::api::models::{documents::UploadMetadata, status::ServiceStatus};
use crate::errors::ErrorBody;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Document Metadata Service",
        description = "Upload documents to local storage and report their metadata."
    ),
    paths(documents::upload_document, status::get_status),
    components(schemas(UploadMetadata, ServiceStatus, ErrorBody)),
    tags(
        (name = "documents", description = "Document upload"),
        (name = "status", description = "Liveness probe"),
    )
)]
pub struct ApiDoc;
