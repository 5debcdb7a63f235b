//! HTTP handlers for upload management.
//! Unpacks the multipart form and the `Content-Range` header, then
//! delegates assembly and persistence to `UploadService`.

use crate::{
    errors::AppError, models::upload::UploadInfo, services::upload_service::UploadService,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// JSON resource for one upload record, content omitted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileResource {
    pub id: Uuid,
    pub user_id: String,
    pub filename: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_time_in_milliseconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<i64>,
    pub url: String,
}

impl From<UploadInfo> for UploadedFileResource {
    fn from(info: UploadInfo) -> Self {
        Self {
            uploaded_time_in_milliseconds: info.uploaded_time_in_milliseconds(),
            url: format!("/api/files/{}", info.id),
            id: info.id,
            user_id: info.user_id,
            filename: info.filename,
            status: info.status.description(),
            chunks: info.chunks,
        }
    }
}

/// POST `/api/files` — store an upload.
///
/// Expects a multipart form with a `userId` text field and a `file` part.
/// A `Content-Range: bytes a-b/c` header marks the request as one chunk of
/// a larger transfer; without it the payload is the whole file.
pub async fn upload(
    State(service): State<UploadService>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let content_range = headers
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let mut user_id: Option<String> = None;
    let mut file: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::unprocessable(err.to_string()))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("userId") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::unprocessable(err.to_string()))?;
                user_id = Some(value);
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::unprocessable(err.to_string()))?;
                file = Some((filename, bytes));
            }
            _ => {}
        }
    }

    let user_id = user_id
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::unprocessable("userId parameter is missing"))?;
    let (filename, payload) =
        file.ok_or_else(|| AppError::unprocessable("file parameter is missing"))?;
    if payload.is_empty() {
        return Err(AppError::unprocessable(format!(
            "Failed to store empty file: {}",
            filename
        )));
    }

    tracing::info!(
        "storing upload {} for userId {} (Content-Range: {:?})",
        filename,
        user_id,
        content_range
    );

    service
        .store(
            &user_id,
            &filename,
            &payload,
            content_range.as_deref(),
            Utc::now(),
        )
        .await?;

    Ok(Json(json!({})))
}

/// GET `/api/files` — list all uploads ordered by user then filename.
pub async fn list_uploads(
    State(service): State<UploadService>,
) -> Result<Json<Vec<UploadedFileResource>>, AppError> {
    let uploads = service.find_all().await?;
    Ok(Json(
        uploads.into_iter().map(UploadedFileResource::from).collect(),
    ))
}

/// GET `/api/files/{id}` — download a completed upload as an attachment.
pub async fn download(
    State(service): State<UploadService>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let file = service.find_by_id(id).await?;

    let mut response = Response::new(Body::from(file.content));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}
