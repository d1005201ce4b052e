//! Document upload endpoint
//!
//! - POST /documents - Upload a PDF, OCR it and store the extracted text

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::auth::CallerIdentity;
use crate::error::{AppError, Result};
use crate::ingest::{DocumentId, UploadedPdf};
use crate::state::AppState;

/// Multipart field carrying the PDF
const FILE_FIELD: &str = "file";
const PDF_MAGIC: &[u8] = b"%PDF-";
const DEFAULT_FILENAME: &str = "upload.pdf";
const DEFAULT_CONTENT_TYPE: &str = "application/pdf";

/// Upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: DocumentId,
    pub content: String,
    pub message: &'static str,
}

/// Create the documents router
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", post(upload_document))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// POST /documents
///
/// Runs the whole pipeline before answering; the response carries the
/// extracted text.
async fn upload_document(
    caller: CallerIdentity,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let upload = read_upload(multipart).await?;

    let report = state
        .coordinator()
        .ingest(caller.as_str(), upload)
        .await?;

    Ok(Json(UploadResponse {
        document_id: report.document_id,
        content: report.content,
        message: "Document uploaded and text extracted successfully",
    }))
}

/// Pull the PDF out of the multipart body
async fn read_upload(mut multipart: Multipart) -> Result<UploadedPdf> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to read upload", e))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string();
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error("Failed to read file data", e))?;

        if data.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }
        if !data.starts_with(PDF_MAGIC) {
            return Err(AppError::BadRequest(
                "Uploaded file is not a PDF".to_string(),
            ));
        }

        return Ok(UploadedPdf {
            filename,
            content_type,
            data,
        });
    }

    Err(AppError::BadRequest(format!(
        "No file provided. Use field name '{}'",
        FILE_FIELD
    )))
}

/// Oversized bodies get 413, anything else malformed gets 400
fn multipart_error(context: &str, e: MultipartError) -> AppError {
    tracing::warn!("{}: {}", context, e);
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("{}: {}", context, e.body_text()))
    } else {
        AppError::BadRequest(format!("{}: {}", context, e.body_text()))
    }
}
