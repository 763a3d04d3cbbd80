use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    files::{File, FileMetadataView, FileUpload},
    middleware::optional_auth::OptionalAuthUser,
    AppState,
};

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCreatedResponse {
    pub id: Uuid,
    pub token: String,
    pub download_url: String,
    pub view_url: String,
    pub expires_at: DateTime<Utc>,
    pub max_downloads: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedFileSummary {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub expires_at: DateTime<Utc>,
    pub download_count: u64,
    pub max_downloads: Option<u64>,
    pub download_url: String,
    pub view_url: String,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<OwnedFileSummary>,
}

struct FileLinks {
    download_url: String,
    view_url: String,
}

impl FileLinks {
    fn new(base_url: &str, token: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            download_url: format!("{}/api/files/{}/download", base, token),
            view_url: format!("{}/api/files/{}", base, token),
        }
    }
}

/// Multipart fields collected before anything is stored.
#[derive(Default)]
struct UploadForm {
    content: Option<(String, Option<String>, Bytes)>,
    expires_at: Option<String>,
    expires_in: Option<String>,
    max_downloads: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            AppError::Validation(format!("Failed to read multipart field: {}", e))
        })? {
            let name = field.name().unwrap_or("").to_string();

            match name.as_str() {
                "file" => {
                    let filename = field.file_name().unwrap_or("").to_string();
                    let content_type = field.content_type().map(str::to_string);
                    let data = field.bytes().await.map_err(|e| {
                        AppError::Validation(format!("Failed to read file data: {}", e))
                    })?;
                    form.content = Some((filename, content_type, data));
                }
                "expiresAt" | "expiresIn" | "maxDownloads" => {
                    let value = field.text().await.map_err(|e| {
                        AppError::Validation(format!("Failed to read field {}: {}", name, e))
                    })?;
                    let value = value.trim().to_string();
                    if value.is_empty() {
                        continue;
                    }
                    match name.as_str() {
                        "expiresAt" => form.expires_at = Some(value),
                        "expiresIn" => form.expires_in = Some(value),
                        _ => form.max_downloads = Some(value),
                    }
                }
                other => debug!("Ignoring unexpected multipart field '{}'", other),
            }
        }

        Ok(form)
    }
}

/// `expiresAt` wins over `expiresIn` when both are present.
fn resolve_expiry(
    expires_at: Option<&str>,
    expires_in: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    if let Some(raw) = expires_at {
        return DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| AppError::Validation("Invalid expiresAt value".to_string()));
    }

    if let Some(raw) = expires_in {
        let seconds: i64 = raw
            .parse()
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| AppError::Validation("Invalid expiresIn value".to_string()))?;
        let offset = Duration::try_seconds(seconds)
            .ok_or_else(|| AppError::Validation("Invalid expiresIn value".to_string()))?;
        return now
            .checked_add_signed(offset)
            .ok_or_else(|| AppError::Validation("Invalid expiresIn value".to_string()));
    }

    Err(AppError::Validation(
        "expiresAt or expiresIn is required".to_string(),
    ))
}

fn parse_max_downloads(raw: Option<&str>) -> Result<Option<u64>> {
    raw.map(|value| {
        value
            .parse::<u64>()
            .map_err(|_| AppError::Validation("Invalid maxDownloads value".to_string()))
    })
    .transpose()
}

fn resolve_mime_type(declared: Option<&str>, filename: &str) -> String {
    match declared.map(str::trim).filter(|m| !m.is_empty()) {
        Some(mime) => mime.to_string(),
        None => mime_guess::from_path(filename)
            .first_raw()
            .unwrap_or(FALLBACK_MIME_TYPE)
            .to_string(),
    }
}

/// Builds an attachment disposition. The quoted `filename` is an ASCII
/// fallback; the original name travels in `filename*`.
fn content_disposition(original_name: &str) -> String {
    let fallback: String = original_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(original_name.len());
    for byte in original_name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

fn parse_file_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("File not found".to_string()))
}

/// POST /api/files
pub async fn upload_file(
    State(state): State<AppState>,
    auth_user: OptionalAuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    if state.require_auth_for_upload && auth_user.0.is_none() {
        return Err(AppError::Authentication("Authentication required".to_string()));
    }

    let form = UploadForm::read(multipart).await?;
    let now = state.file_manager.now();

    let (filename, declared_mime, content) = form
        .content
        .ok_or_else(|| AppError::Validation("File is required".to_string()))?;
    let expires_at = resolve_expiry(form.expires_at.as_deref(), form.expires_in.as_deref(), now)?;
    let max_downloads = parse_max_downloads(form.max_downloads.as_deref())?;

    let upload = FileUpload {
        mime_type: resolve_mime_type(declared_mime.as_deref(), &filename),
        size_bytes: content.len() as u64,
        content,
        original_name: filename,
        expires_at,
        owner_id: auth_user.user_id().map(str::to_string),
        max_downloads,
    };

    let file = state.file_manager.create(upload).await?;
    let links = FileLinks::new(&state.download_base_url, &file.download_token);

    info!("POST /api/files - Stored file {} ({} bytes)", file.id, file.size_bytes);

    Ok((
        StatusCode::CREATED,
        Json(FileCreatedResponse {
            id: file.id,
            token: file.download_token,
            download_url: links.download_url,
            view_url: links.view_url,
            expires_at: file.expires_at,
            max_downloads: file.max_downloads,
        }),
    ))
}

/// GET /api/files
pub async fn list_files(
    State(state): State<AppState>,
    auth_user: OptionalAuthUser,
) -> Result<Json<FileListResponse>> {
    let user = auth_user.required()?;
    let files = state.file_manager.list_by_owner(&user.user_id).await?;

    debug!("GET /api/files - {} files for caller", files.len());

    let files = files
        .into_iter()
        .map(|file| {
            let links = FileLinks::new(&state.download_base_url, &file.download_token);
            OwnedFileSummary {
                id: file.id,
                name: file.original_name,
                size: file.size_bytes,
                mime_type: file.mime_type,
                expires_at: file.expires_at,
                download_count: file.download_count,
                max_downloads: file.max_downloads,
                download_url: links.download_url,
                view_url: links.view_url,
            }
        })
        .collect();

    Ok(Json(FileListResponse { files }))
}

/// Refuses files past either bound before any content is touched.
fn ensure_accessible(file: &File, now: DateTime<Utc>) -> Result<()> {
    if file.is_expired(now) {
        return Err(AppError::Gone("File has expired".to_string()));
    }
    if file.is_exhausted() {
        return Err(AppError::LimitExceeded);
    }
    Ok(())
}

/// GET /api/files/:token
pub async fn get_file_metadata(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<FileMetadataView>> {
    let file = state.file_manager.get_by_token(&token).await?;
    ensure_accessible(&file, state.file_manager.now())?;

    Ok(Json(FileMetadataView::from(&file)))
}

/// GET /api/files/:token/download
pub async fn download_file(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response> {
    let file = state.file_manager.get_by_token(&token).await?;
    if file.is_expired(state.file_manager.now()) {
        return Err(AppError::Gone("File has expired".to_string()));
    }

    // The count is consumed before streaming starts; a dropped connection
    // still counts as a delivery attempt.
    let file = state.file_manager.register_download(&file).await?;
    let stream = state.file_manager.open_content(&file).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&file.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_MIME_TYPE)),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(&file.original_name))
            .map_err(|e| AppError::Other(anyhow::anyhow!("invalid disposition header: {}", e)))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file.size_bytes));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    info!(
        file_id = %file.id,
        download_count = file.download_count,
        "GET /api/files/:token/download - Streaming file"
    );

    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

/// DELETE /api/files/:id
pub async fn delete_file(
    State(state): State<AppState>,
    auth_user: OptionalAuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_file_id(&id)?;
    let file = state.file_manager.get_by_id(id, None).await?;

    if file.owner_id.is_some() {
        let allowed = auth_user
            .user_id()
            .map(|caller| file.is_owned_by(caller))
            .unwrap_or(false);
        if !allowed {
            return Err(AppError::Authorization("Access denied".to_string()));
        }
    }

    state.file_manager.delete(&file).await?;
    info!("DELETE /api/files/{} - Deleted", id);

    Ok(StatusCode::NO_CONTENT)
}
