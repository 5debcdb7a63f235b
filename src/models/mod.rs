//! Core data models for the file-upload service.
//!
//! These entities represent uploads as they are persisted. They map
//! cleanly to database rows via `sqlx::FromRow` and serialize naturally as
//! JSON via `serde`.

pub mod upload;
