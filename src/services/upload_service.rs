//! src/services/upload_service.rs
//!
//! UploadService — chunked-upload assembly backed by SQLite for upload
//! records and local disk for in-flight staging files. Each upload is keyed
//! by `(user_id, filename)`: chunks are appended to a per-key staging file
//! beneath `staging_dir`, and finalization moves the assembled bytes into
//! the durable record in one transition.

use crate::models::upload::{UploadInfo, UploadRecord, UploadStatus};
use crate::range::{self, RangeError};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error("Cannot store file with relative path outside current directory: {0}")]
    UnsafeFilename(String),
    #[error("Resource not found for id: {0}")]
    NotFound(Uuid),
    #[error("Cannot download an incomplete resource. Resource {id} has status {status}")]
    Incomplete { id: Uuid, status: &'static str },
    #[error("{cause}")]
    Storage { cause: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// A completed upload ready to be served as an attachment.
#[derive(Debug)]
pub struct DownloadableFile {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Record state transition applied at the end of a store operation.
///
/// Exactly one variant per target status; the fields carry everything the
/// transition is allowed to touch. `created_at` is only ever written on
/// first insert and `id` is never rewritten.
enum Transition {
    Pending,
    Completed {
        chunks: Option<i64>,
        content: Vec<u8>,
    },
    Failed {
        chunks: Option<i64>,
        root_cause: String,
    },
}

/// UploadService owns the staging area and the upload-record lifecycle:
/// - Store a payload (append to staging, then finalize or mark pending)
/// - List upload records without their content
/// - Fetch a completed upload for download
///
/// All staging and record steps for one `(user_id, filename)` run under a
/// per-key async mutex, so concurrent chunks for the same key serialize
/// while distinct keys proceed independently.
#[derive(Clone)]
pub struct UploadService {
    /// Shared SQLite connection pool holding upload records.
    pub db: Arc<SqlitePool>,

    /// Directory holding in-flight staging files.
    pub staging_dir: PathBuf,

    /// Policy cap on the declared total size of an upload.
    pub max_file_size_bytes: u64,

    /// Policy cap on a single chunk.
    pub max_chunk_size_bytes: u64,

    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl UploadService {
    pub fn new(
        db: Arc<SqlitePool>,
        staging_dir: impl Into<PathBuf>,
        max_file_size_bytes: u64,
        max_chunk_size_bytes: u64,
    ) -> Self {
        Self {
            db,
            staging_dir: staging_dir.into(),
            max_file_size_bytes,
            max_chunk_size_bytes,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Store one incoming payload, chunked or not.
    ///
    /// The optional `Content-Range` header is resolved against the size
    /// policy before anything is written; a malformed header or a policy
    /// violation leaves both the staging area and the record untouched.
    ///
    /// Chunks are appended in arrival order. The service neither
    /// deduplicates by offset nor reorders: a client that resends an
    /// already-acknowledged chunk corrupts its own upload.
    pub async fn store(
        &self,
        user_id: &str,
        filename: &str,
        payload: &[u8],
        content_range: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> UploadResult<()> {
        let plan = range::plan_transfer(
            content_range,
            payload.len() as u64,
            self.max_file_size_bytes,
            self.max_chunk_size_bytes,
        )?;

        self.store_chunk(
            user_id,
            filename,
            payload,
            plan.total_chunks,
            plan.last_chunk,
            received_at,
        )
        .await
    }

    /// Append one chunk and advance the record lifecycle.
    ///
    /// On the last chunk the staging file is read back, the record is
    /// upserted to COMPLETED, and the staging file is removed. An
    /// intermediate chunk creates a PENDING record on first contact and
    /// leaves an existing record untouched. Any failure while assembling
    /// advances the record to FAILED with the captured cause and removes
    /// the staging file, so a key is never left PENDING after an error.
    pub async fn store_chunk(
        &self,
        user_id: &str,
        filename: &str,
        payload: &[u8],
        total_chunks: Option<i64>,
        last_chunk: bool,
        received_at: DateTime<Utc>,
    ) -> UploadResult<()> {
        let filename = sanitize_filename(filename)?;

        let lock = self.key_lock(user_id, &filename).await;
        let _guard = lock.lock().await;

        let staging = self.staging_path(user_id, &filename);
        let completed = match self
            .assemble(user_id, &filename, payload, total_chunks, last_chunk, received_at)
            .await
        {
            Ok(completed) => completed,
            Err(err) => {
                let cause = format!(
                    "Could not process given file: userId {}, filename {}. Exception: {}",
                    user_id, filename, err
                );
                error!("{}", cause);

                let failed = Transition::Failed {
                    chunks: total_chunks,
                    root_cause: cause.clone(),
                };
                if let Err(err) = self
                    .apply_transition(user_id, &filename, failed, received_at)
                    .await
                {
                    debug!(
                        "could not record failure for userId {} filename {}: {}",
                        user_id, filename, err
                    );
                }
                if let Err(err) = fs::remove_file(&staging).await {
                    if err.kind() != ErrorKind::NotFound {
                        debug!(
                            "could not remove staging file {}: {}",
                            staging.display(),
                            err
                        );
                    }
                }

                return Err(UploadError::Storage { cause });
            }
        };

        if completed {
            // The COMPLETED row is already committed and stays the source
            // of truth; a staging file we fail to remove is surfaced but
            // never demotes the record.
            if let Err(err) = fs::remove_file(&staging).await {
                if err.kind() != ErrorKind::NotFound {
                    let cause = format!(
                        "Could not delete temporary file at {}. Exception: {}",
                        staging.display(),
                        err
                    );
                    error!("{}", cause);
                    return Err(UploadError::Storage { cause });
                }
            }
        }

        Ok(())
    }

    /// Staging append plus the success-path record transition. Returns
    /// whether the upload finalized. The caller owns failure capture and
    /// staging cleanup.
    async fn assemble(
        &self,
        user_id: &str,
        filename: &str,
        payload: &[u8],
        total_chunks: Option<i64>,
        last_chunk: bool,
        received_at: DateTime<Utc>,
    ) -> UploadResult<bool> {
        fs::create_dir_all(&self.staging_dir).await?;

        let exists = self.exists(user_id, filename).await?;

        let staging = self.staging_path(user_id, filename);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&staging)
            .await?;
        // A short write poisons the staging unit; the failure path in
        // store_chunk removes it before any later request can read it.
        file.write_all(payload).await?;
        file.flush().await?;
        file.sync_all().await?;

        if last_chunk {
            let content = fs::read(&staging).await?;
            debug!(
                "finalizing upload for userId {} filename {} ({} bytes, {:?} chunks)",
                user_id,
                filename,
                content.len(),
                total_chunks
            );
            self.apply_transition(
                user_id,
                filename,
                Transition::Completed {
                    chunks: total_chunks,
                    content,
                },
                received_at,
            )
            .await?;
        } else if !exists {
            self.apply_transition(user_id, filename, Transition::Pending, received_at)
                .await?;
        }

        Ok(last_chunk)
    }

    /// Upsert the record for a key into the state named by `transition`.
    ///
    /// One statement per variant: the INSERT arm seeds a fresh id and
    /// `created_at`, the conflict arm advances the existing row. A
    /// COMPLETED transition clears `root_cause` and a FAILED one clears
    /// `content`, keeping the two mutually exclusive across retries. An
    /// intermediate-chunk PENDING transition never touches an existing row.
    async fn apply_transition(
        &self,
        user_id: &str,
        filename: &str,
        transition: Transition,
        received_at: DateTime<Utc>,
    ) -> UploadResult<()> {
        match transition {
            Transition::Pending => {
                sqlx::query(
                    "INSERT INTO uploaded_files (id, user_id, filename, status, created_at)
                     VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT(user_id, filename) DO NOTHING",
                )
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(filename)
                .bind(UploadStatus::Pending)
                .bind(received_at)
                .execute(&*self.db)
                .await?;
            }
            Transition::Completed { chunks, content } => {
                sqlx::query(
                    "INSERT INTO uploaded_files
                         (id, user_id, filename, status, created_at, last_modified_at, chunks, content)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(user_id, filename) DO UPDATE SET
                         status = excluded.status,
                         last_modified_at = ?,
                         chunks = excluded.chunks,
                         content = excluded.content,
                         root_cause = NULL",
                )
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(filename)
                .bind(UploadStatus::Completed)
                .bind(received_at)
                .bind(Utc::now())
                // finalization assigns 1 when no chunk count was declared
                .bind(chunks.unwrap_or(1))
                .bind(content)
                .bind(received_at)
                .execute(&*self.db)
                .await?;
            }
            Transition::Failed { chunks, root_cause } => {
                sqlx::query(
                    "INSERT INTO uploaded_files
                         (id, user_id, filename, status, created_at, last_modified_at, chunks, root_cause)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(user_id, filename) DO UPDATE SET
                         status = excluded.status,
                         last_modified_at = ?,
                         chunks = ?,
                         content = NULL,
                         root_cause = excluded.root_cause",
                )
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(filename)
                .bind(UploadStatus::Failed)
                .bind(received_at)
                .bind(Utc::now())
                .bind(chunks.unwrap_or(1))
                .bind(root_cause)
                .bind(received_at)
                .bind(chunks)
                .execute(&*self.db)
                .await?;
            }
        }

        Ok(())
    }

    /// Whether a record exists for `(user_id, filename)`.
    pub async fn exists(&self, user_id: &str, filename: &str) -> UploadResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(1) FROM uploaded_files WHERE user_id = ? AND filename = ?",
        )
        .bind(user_id)
        .bind(filename)
        .fetch_one(&*self.db)
        .await?;

        Ok(count > 0)
    }

    /// All upload records without their content, ordered by user then
    /// filename.
    pub async fn find_all(&self) -> UploadResult<Vec<UploadInfo>> {
        let uploads = sqlx::query_as::<_, UploadInfo>(
            "SELECT id, user_id, filename, status, created_at, last_modified_at, chunks
             FROM uploaded_files
             ORDER BY user_id ASC, filename ASC",
        )
        .fetch_all(&*self.db)
        .await?;

        Ok(uploads)
    }

    /// Fetch a completed upload for download.
    ///
    /// An unknown id is NotFound; a PENDING or FAILED record cannot be
    /// downloaded.
    pub async fn find_by_id(&self, id: Uuid) -> UploadResult<DownloadableFile> {
        let record = sqlx::query_as::<_, UploadRecord>(
            "SELECT id, user_id, filename, status, created_at, last_modified_at,
                    chunks, content, root_cause
             FROM uploaded_files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(UploadError::NotFound(id))?;

        if record.status != UploadStatus::Completed {
            return Err(UploadError::Incomplete {
                id,
                status: record.status.description(),
            });
        }

        Ok(DownloadableFile {
            filename: record.filename,
            content: record.content.unwrap_or_default(),
        })
    }

    /// Critical section for one `(user_id, filename)` key. Entries stay in
    /// the map for the process lifetime; they are a few bytes each.
    async fn key_lock(&self, user_id: &str, filename: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(format!("{}/{}", user_id, filename))
            .or_default()
            .clone()
    }

    /// Deterministic staging path for a key.
    ///
    /// Uses an MD5 digest of `user_id/filename` so distinct keys can never
    /// share a staging file, whatever characters the filename contains.
    fn staging_path(&self, user_id: &str, filename: &str) -> PathBuf {
        let digest = md5::compute(format!("{}/{}", user_id, filename));
        self.staging_dir.join(format!("{:x}.part", digest))
    }
}

/// Normalize a client-supplied filename and reject unsafe ones.
///
/// Backslashes become `/`, empty and `.` segments are dropped, and any
/// `..` segment, absolute path, control character, or effectively-empty
/// name is refused.
fn sanitize_filename(filename: &str) -> UploadResult<String> {
    let normalized = filename.trim().replace('\\', "/");
    if normalized.starts_with('/') || normalized.bytes().any(|b| b.is_ascii_control()) {
        return Err(UploadError::UnsafeFilename(filename.to_string()));
    }

    let segments: Vec<&str> = normalized
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.is_empty() || segments.iter().any(|segment| *segment == "..") {
        return Err(UploadError::UnsafeFilename(filename.to_string()));
    }

    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    const MAX_FILE: u64 = 1000;
    const MAX_CHUNK: u64 = 10;

    async fn service_with_limits(max_file: u64, max_chunk: u64) -> (UploadService, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        for statement in include_str!("../../migrations/0001_init.sql")
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }

        let service = UploadService::new(
            Arc::new(pool),
            dir.path().join("staging"),
            max_file,
            max_chunk,
        );
        (service, dir)
    }

    async fn test_service() -> (UploadService, TempDir) {
        service_with_limits(MAX_FILE, MAX_CHUNK).await
    }

    async fn fetch(
        service: &UploadService,
        user_id: &str,
        filename: &str,
    ) -> Option<UploadRecord> {
        sqlx::query_as::<_, UploadRecord>(
            "SELECT id, user_id, filename, status, created_at, last_modified_at,
                    chunks, content, root_cause
             FROM uploaded_files WHERE user_id = ? AND filename = ?",
        )
        .bind(user_id)
        .bind(filename)
        .fetch_optional(&*service.db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn non_chunked_upload_completes_with_one_chunk() {
        let (service, _dir) = test_service().await;

        assert!(!service.exists("alice", "report.pdf").await.unwrap());
        service
            .store("alice", "report.pdf", b"test data", None, Utc::now())
            .await
            .unwrap();
        assert!(service.exists("alice", "report.pdf").await.unwrap());

        let record = fetch(&service, "alice", "report.pdf").await.unwrap();
        assert_eq!(record.status, UploadStatus::Completed);
        assert_eq!(record.chunks, Some(1));
        assert_eq!(record.content.as_deref(), Some(b"test data".as_slice()));
        assert!(record.root_cause.is_none());
        assert!(!service.staging_path("alice", "report.pdf").exists());
    }

    #[tokio::test]
    async fn single_chunk_range_completes_immediately() {
        let (service, _dir) = test_service().await;

        service
            .store("alice", "tiny.bin", b"abcd", Some("bytes 0-3/4"), Utc::now())
            .await
            .unwrap();

        let record = fetch(&service, "alice", "tiny.bin").await.unwrap();
        assert_eq!(record.status, UploadStatus::Completed);
        assert_eq!(record.chunks, Some(1));
        assert_eq!(record.content.as_deref(), Some(b"abcd".as_slice()));
        assert!(!service.staging_path("alice", "tiny.bin").exists());
    }

    #[tokio::test]
    async fn sequential_chunks_assemble_in_order() {
        let (service, _dir) = service_with_limits(1000, 1).await;
        let first_seen = Utc::now();

        service
            .store("alice", "digits.txt", b"1", Some("bytes 0-0/4"), first_seen)
            .await
            .unwrap();

        let record = fetch(&service, "alice", "digits.txt").await.unwrap();
        assert_eq!(record.status, UploadStatus::Pending);
        assert!(record.content.is_none());
        assert!(record.chunks.is_none());
        assert!(record.last_modified_at.is_none());
        assert!(service.staging_path("alice", "digits.txt").exists());

        for (payload, header) in [
            (b"2", "bytes 1-1/4"),
            (b"3", "bytes 2-2/4"),
        ] {
            service
                .store("alice", "digits.txt", payload, Some(header), Utc::now())
                .await
                .unwrap();
        }
        let finalized_at = Utc::now();
        service
            .store("alice", "digits.txt", b"4", Some("bytes 3-3/4"), finalized_at)
            .await
            .unwrap();

        let record = fetch(&service, "alice", "digits.txt").await.unwrap();
        assert_eq!(record.status, UploadStatus::Completed);
        assert_eq!(record.chunks, Some(4));
        assert_eq!(record.content.as_deref(), Some(b"1234".as_slice()));
        assert_eq!(
            record.created_at.timestamp_millis(),
            first_seen.timestamp_millis()
        );
        assert_eq!(
            record.last_modified_at.unwrap().timestamp_millis(),
            finalized_at.timestamp_millis()
        );
        assert!(!service.staging_path("alice", "digits.txt").exists());
    }

    #[tokio::test]
    async fn intermediate_chunks_leave_the_record_untouched() {
        let (service, _dir) = service_with_limits(1000, 1).await;

        service
            .store("alice", "slow.txt", b"a", Some("bytes 0-0/3"), Utc::now())
            .await
            .unwrap();
        let created = fetch(&service, "alice", "slow.txt").await.unwrap();

        service
            .store("alice", "slow.txt", b"b", Some("bytes 1-1/3"), Utc::now())
            .await
            .unwrap();
        let after_second = fetch(&service, "alice", "slow.txt").await.unwrap();

        assert_eq!(after_second.id, created.id);
        assert_eq!(after_second.status, UploadStatus::Pending);
        assert!(after_second.last_modified_at.is_none());
        assert!(after_second.chunks.is_none());
    }

    #[tokio::test]
    async fn oversized_declared_total_is_rejected_before_staging() {
        let (service, _dir) = test_service().await;

        let err = service
            .store(
                "alice",
                "big.bin",
                b"xxxxxxxxxx",
                Some("bytes 0-9/2000"),
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Range(RangeError::FileTooLarge { total: 2000, .. })
        ));
        assert!(fetch(&service, "alice", "big.bin").await.is_none());
        assert!(!service.staging_path("alice", "big.bin").exists());
    }

    #[tokio::test]
    async fn oversized_chunk_is_rejected_and_existing_state_survives() {
        let (service, _dir) = test_service().await;

        service
            .store(
                "alice",
                "parts.bin",
                b"0123456789",
                Some("bytes 0-9/30"),
                Utc::now(),
            )
            .await
            .unwrap();

        let err = service
            .store(
                "alice",
                "parts.bin",
                b"0123456789abcdef",
                Some("bytes 10-25/30"),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::Range(RangeError::ChunkTooLarge { size: 16, .. })
        ));

        let record = fetch(&service, "alice", "parts.bin").await.unwrap();
        assert_eq!(record.status, UploadStatus::Pending);
        let staged = std::fs::read(service.staging_path("alice", "parts.bin")).unwrap();
        assert_eq!(staged, b"0123456789");
    }

    #[tokio::test]
    async fn malformed_header_is_rejected_without_side_effects() {
        let (service, _dir) = test_service().await;

        let err = service
            .store(
                "alice",
                "odd.bin",
                b"x",
                Some("bytes 1aaa-1000/10000"),
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Range(RangeError::Malformed(_))));
        assert!(fetch(&service, "alice", "odd.bin").await.is_none());
    }

    #[tokio::test]
    async fn traversal_filenames_are_refused() {
        let (service, _dir) = test_service().await;

        for filename in ["../../etc/passwd", "..\\secret.txt", "/etc/passwd", "a/../b"] {
            let err = service
                .store("alice", filename, b"x", None, Utc::now())
                .await
                .unwrap_err();
            assert!(matches!(err, UploadError::UnsafeFilename(_)), "{filename}");
            assert!(fetch(&service, "alice", filename).await.is_none());
        }
    }

    #[tokio::test]
    async fn storage_failure_marks_the_record_failed_then_retry_recovers() {
        let (service, dir) = test_service().await;

        // Occupy the staging directory path with a plain file so directory
        // creation fails before any byte is written.
        std::fs::write(dir.path().join("staging"), b"not a directory").unwrap();

        let err = service
            .store("alice", "doomed.txt", b"x", None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Storage { .. }));

        let record = fetch(&service, "alice", "doomed.txt").await.unwrap();
        assert_eq!(record.status, UploadStatus::Failed);
        assert_eq!(record.chunks, Some(1));
        assert!(record.content.is_none());
        let cause = record.root_cause.unwrap();
        assert!(cause.starts_with("Could not process given file: userId alice"));

        // Unblock the staging directory; the retry must complete and clear
        // the failure.
        std::fs::remove_file(dir.path().join("staging")).unwrap();
        service
            .store("alice", "doomed.txt", b"second try", None, Utc::now())
            .await
            .unwrap();

        let record = fetch(&service, "alice", "doomed.txt").await.unwrap();
        assert_eq!(record.status, UploadStatus::Completed);
        assert_eq!(record.content.as_deref(), Some(b"second try".as_slice()));
        assert!(record.root_cause.is_none());
    }

    #[tokio::test]
    async fn finalization_failure_advances_pending_to_failed() {
        let (service, _dir) = service_with_limits(1000, 1).await;

        service
            .store("alice", "twice.txt", b"a", Some("bytes 0-0/2"), Utc::now())
            .await
            .unwrap();

        // Turn the staging file into a directory so the final append blows
        // up mid-assembly.
        let staging = service.staging_path("alice", "twice.txt");
        std::fs::remove_file(&staging).unwrap();
        std::fs::create_dir(&staging).unwrap();

        let err = service
            .store("alice", "twice.txt", b"b", Some("bytes 1-1/2"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Storage { .. }));

        let record = fetch(&service, "alice", "twice.txt").await.unwrap();
        assert_eq!(record.status, UploadStatus::Failed);
        assert_eq!(record.chunks, Some(2));
        assert!(record.root_cause.is_some());
        assert!(record.content.is_none());
    }

    #[tokio::test]
    async fn reupload_overwrites_content_and_keeps_the_id() {
        let (service, _dir) = test_service().await;

        service
            .store("alice", "same.txt", b"first", None, Utc::now())
            .await
            .unwrap();
        let original = fetch(&service, "alice", "same.txt").await.unwrap();

        service
            .store("alice", "same.txt", b"second", None, Utc::now())
            .await
            .unwrap();
        let replaced = fetch(&service, "alice", "same.txt").await.unwrap();

        assert_eq!(replaced.id, original.id);
        assert_eq!(replaced.status, UploadStatus::Completed);
        assert_eq!(replaced.chunks, Some(1));
        assert_eq!(replaced.content.as_deref(), Some(b"second".as_slice()));
    }

    #[tokio::test]
    async fn download_requires_a_completed_record() {
        let (service, _dir) = test_service().await;

        service
            .store("alice", "done.txt", b"test data", None, Utc::now())
            .await
            .unwrap();
        let completed = fetch(&service, "alice", "done.txt").await.unwrap();

        let file = service.find_by_id(completed.id).await.unwrap();
        assert_eq!(file.filename, "done.txt");
        assert_eq!(file.content, b"test data");

        service
            .store("alice", "wip.txt", b"x", Some("bytes 0-0/4"), Utc::now())
            .await
            .unwrap();
        let pending = fetch(&service, "alice", "wip.txt").await.unwrap();

        let err = service.find_by_id(pending.id).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Incomplete {
                status: "Pending",
                ..
            }
        ));

        let err = service.find_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, UploadError::NotFound(_)));
    }

    #[tokio::test]
    async fn find_all_orders_by_user_then_filename_without_content() {
        let (service, _dir) = test_service().await;

        service
            .store("bob", "z.txt", b"z", None, Utc::now())
            .await
            .unwrap();
        service
            .store("alice", "b.txt", b"b", None, Utc::now())
            .await
            .unwrap();
        service
            .store("alice", "a.txt", b"x", Some("bytes 0-0/4"), Utc::now())
            .await
            .unwrap();

        let uploads = service.find_all().await.unwrap();
        let keys: Vec<(String, String)> = uploads
            .iter()
            .map(|u| (u.user_id.clone(), u.filename.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("alice".into(), "a.txt".into()),
                ("alice".into(), "b.txt".into()),
                ("bob".into(), "z.txt".into()),
            ]
        );

        assert_eq!(uploads[0].status, UploadStatus::Pending);
        assert!(uploads[0].uploaded_time_in_milliseconds().is_none());
        assert!(uploads[1].uploaded_time_in_milliseconds().unwrap() >= 0);
    }

    #[tokio::test]
    async fn concurrent_stores_for_the_same_key_serialize() {
        let (service, _dir) = test_service().await;

        let first = service.clone();
        let second = service.clone();
        let (a, b) = tokio::join!(
            first.store("alice", "race.txt", b"aaaa", None, Utc::now()),
            second.store("alice", "race.txt", b"bbbb", None, Utc::now()),
        );
        a.unwrap();
        b.unwrap();

        let record = fetch(&service, "alice", "race.txt").await.unwrap();
        assert_eq!(record.status, UploadStatus::Completed);
        let content = record.content.unwrap();
        assert!(content == b"aaaa" || content == b"bbbb");
        assert!(!service.staging_path("alice", "race.txt").exists());
    }

    #[test]
    fn sanitize_normalizes_and_rejects() {
        assert_eq!(sanitize_filename("report.pdf").unwrap(), "report.pdf");
        assert_eq!(
            sanitize_filename("photos\\2025\\img.jpg").unwrap(),
            "photos/2025/img.jpg"
        );
        assert_eq!(sanitize_filename("./a/./b.txt").unwrap(), "a/b.txt");
        assert_eq!(sanitize_filename("a//b.txt").unwrap(), "a/b.txt");

        assert!(sanitize_filename("/etc/passwd").is_err());
        assert!(sanitize_filename("../up.txt").is_err());
        assert!(sanitize_filename("a/../b").is_err());
        assert!(sanitize_filename("   ").is_err());
        assert!(sanitize_filename("bad\u{0}name").is_err());
    }
}
