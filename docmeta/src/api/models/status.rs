use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const SERVICE_NAME: &str = "document-metadata";

/// Liveness probe response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"service": "document-metadata", "status": "running"}))]
pub struct ServiceStatus {
    pub service: String,
    pub status: String,
}

impl ServiceStatus {
    pub fn running() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            status: "running".to_string(),
        }
    }
}
