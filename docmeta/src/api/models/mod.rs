//! API response data models.
//!
//! - [`documents`]: Metadata returned for a stored upload
//! - [`status`]: Liveness probe body

pub mod documents;
pub mod status;
