use crate::clock::iso_micros;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Metadata for a stored document. Returned to the caller and logged, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "filename": "report.pdf",
    "size_bytes": 48213,
    "uploaded_at": "2024-01-15T10:30:00.123456"
}))]
pub struct UploadMetadata {
    /// Filename exactly as supplied by the client
    pub filename: String,
    /// Size of the stored file in bytes
    pub size_bytes: u64,
    /// UTC upload time, ISO-8601 with microseconds and no offset
    #[serde(with = "iso_micros")]
    #[schema(value_type = String, example = "2024-01-15T10:30:00.123456")]
    pub uploaded_at: NaiveDateTime,
}
