//! Defines routes for upload management.
//!
//! ## Structure
//! - `GET  /api/files` — list uploaded files (no content)
//! - `POST /api/files` — upload a file, multipart or chunked transfer
//! - `GET  /api/files/{id}` — download a completed upload
//!
//! Health endpoints are mounted at the root.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{download, list_uploads, upload},
    },
    services::upload_service::UploadService,
};
use axum::{
    Router,
    routing::get,
};

/// Build and return the router for all upload routes.
///
/// The router carries shared state (`UploadService`) to all handlers.
pub fn routes() -> Router<UploadService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // upload management
        .route("/api/files", get(list_uploads).post(upload))
        .route("/api/files/{id}", get(download))
}
