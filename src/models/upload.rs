//! Represents one logical uploaded file owned by one user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state of an upload.
///
/// PENDING while chunks are still arriving, then exactly one of the
/// terminal states: COMPLETED (content assembled and stored) or FAILED
/// (assembly or persistence broke down).
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    Pending,
    Completed,
    Failed,
}

impl UploadStatus {
    /// Human-readable form used in API resources and error messages.
    pub fn description(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "Pending",
            UploadStatus::Completed => "Completed",
            UploadStatus::Failed => "Failed",
        }
    }
}

/// The durable record of an upload, unique per `(user_id, filename)`.
///
/// `content` is populated only on COMPLETED rows and `root_cause` only on
/// FAILED rows; the transition statements in the upload service keep the
/// two mutually exclusive.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadRecord {
    /// Internal UUID, assigned on first creation and never reused.
    pub id: Uuid,

    /// Owning user. Not unique on its own.
    pub user_id: String,

    /// Sanitized filename, unique together with `user_id`.
    pub filename: String,

    /// Current lifecycle state.
    pub status: UploadStatus,

    /// When the first byte for this key arrived. Immutable once set.
    pub created_at: DateTime<Utc>,

    /// Most recent state transition; NULL while PENDING with no
    /// finalization attempted yet.
    pub last_modified_at: Option<DateTime<Utc>>,

    /// Total chunk count, once known.
    pub chunks: Option<i64>,

    /// Fully assembled payload (COMPLETED rows only).
    pub content: Option<Vec<u8>>,

    /// Failure description (FAILED rows only).
    pub root_cause: Option<String>,
}

/// Content-free projection of [`UploadRecord`] for listings.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadInfo {
    pub id: Uuid,
    pub user_id: String,
    pub filename: String,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub chunks: Option<i64>,
}

impl UploadInfo {
    /// Wall-clock duration of the upload in milliseconds, available once a
    /// state transition has stamped `last_modified_at`.
    pub fn uploaded_time_in_milliseconds(&self) -> Option<i64> {
        self.last_modified_at
            .map(|last| last.timestamp_millis() - self.created_at.timestamp_millis())
    }
}
