//! HTTP request handlers.
//!
//! - [`documents`]: Document upload
//! - [`status`]: Liveness probe
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to an HTTP status and a
//! `{"error": ...}` JSON body, and logs the failure.

pub mod documents;
pub mod status;
