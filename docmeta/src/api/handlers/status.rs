//! HTTP handler for the liveness probe.

use axum::Json;

use crate::api::models::status::ServiceStatus;

#[utoipa::path(
    get,
    path = "/status",
    tag = "status",
    summary = "Service status",
    description = "Liveness probe. Always reports running while the process is up; storage is not checked.",
    responses(
        (status = 200, description = "Service is running", body = ServiceStatus),
    )
)]
pub async fn get_status() -> Json<ServiceStatus> {
    Json(ServiceStatus::running())
}
