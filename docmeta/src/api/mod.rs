//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Response data structures
//!
//! # API Structure
//!
//! - `POST /upload`: store a document and return its metadata
//! - `GET /status`: liveness probe
//!
//! Both routes are documented with `utoipa`; the OpenAPI document is served at
//! `/api-docs/openapi.json`.

pub mod handlers;
pub mod models;
