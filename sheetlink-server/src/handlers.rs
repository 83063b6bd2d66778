//! HTTP request handlers for API endpoints

use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::types::{DocsResponse, HealthResponse, RootResponse};

/// Multipart field carrying the workbook
pub const FILE_FIELD: &str = "file";

// RFC 5987 attr-char: everything else is percent-encoded
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

pub async fn root() -> impl IntoResponse {
    Json(RootResponse {
        message: "Excel Formula Processor API готов".to_string(),
        endpoint: "/process-excel/".to_string(),
    })
}

pub async fn docs(State(state): State<AppState>) -> impl IntoResponse {
    let base = state.public_url.trim_end_matches('/');
    Json(DocsResponse {
        docs: format!("{base}/docs"),
        redoc: format!("{base}/redoc"),
    })
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Process an uploaded workbook and return it as an attachment
pub async fn process_excel(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = Uuid::new_v4();

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((filename, bytes)) = upload else {
        warn!(%request_id, "upload without a file field");
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Field '{FILE_FIELD}' is required"),
        ));
    };
    info!(%request_id, filename = %filename, bytes = bytes.len(), "processing upload");

    let processor = state.processor.clone();
    let name = filename.clone();
    let result = tokio::task::spawn_blocking(move || processor.process(&name, bytes.to_vec()))
        .await
        .map_err(|e| {
            error!(%request_id, "processing task failed: {e}");
            ApiError::internal(e)
        })?;

    let processed = match result {
        Ok(processed) => processed,
        Err(e) if e.is_client_error() => {
            warn!(%request_id, filename = %filename, "rejected: {e}");
            return Err(e.into());
        }
        Err(e) => {
            error!(%request_id, filename = %filename, "processing failed: {e}");
            return Err(e.into());
        }
    };

    let disposition = HeaderValue::from_str(&content_disposition(&processed.filename))
        .map_err(ApiError::internal)?;
    info!(
        %request_id,
        output = %processed.filename,
        bytes = processed.bytes.len(),
        "returning processed workbook"
    );

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static(processed.content_type)),
            (CONTENT_DISPOSITION, disposition),
        ],
        processed.bytes,
    ))
}

/// `attachment` disposition with an ASCII fallback and the UTF-8 name
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(filename, ATTR_CHAR);
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
