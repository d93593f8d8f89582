//! Validation Gate — upload checks that run before any completion call.
//!
//! Order: presence and type, then size (before extraction), then emptiness
//! (after extraction). The page advisory never blocks the pipeline.

use serde::Serialize;

use crate::errors::AppError;
use crate::models::document::{ExtractedText, UploadedDocument};

/// Resumes longer than this get an advisory, not a rejection.
pub const ADVISORY_PAGE_LIMIT: usize = 3;

const PDF_MIME_TYPE: &str = "application/pdf";

/// A non-fatal note returned alongside the result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisory {
    pub code: &'static str,
    pub message: String,
}

/// Rejects missing and non-PDF uploads. A missing content type is let
/// through; the parser decides.
pub fn check_document(document: &UploadedDocument) -> Result<(), AppError> {
    if document.declared_size == 0 || document.bytes.is_empty() {
        return Err(AppError::MissingDocument);
    }

    match document.content_type.as_deref() {
        Some(ct) if !is_pdf_content_type(ct) => Err(AppError::UnsupportedFileType(ct.to_string())),
        _ => Ok(()),
    }
}

fn is_pdf_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    essence.eq_ignore_ascii_case(PDF_MIME_TYPE)
        // Browsers send this for files they cannot type.
        || essence.eq_ignore_ascii_case("application/octet-stream")
}

pub fn check_size(size: usize, limit: usize) -> Result<(), AppError> {
    if size > limit {
        return Err(AppError::DocumentTooLarge { size, limit });
    }
    Ok(())
}

pub fn check_not_empty(text: &ExtractedText) -> Result<(), AppError> {
    if text.is_blank() {
        return Err(AppError::EmptyDocument);
    }
    Ok(())
}

pub fn page_advisory(text: &ExtractedText) -> Option<Advisory> {
    (text.page_count > ADVISORY_PAGE_LIMIT).then(|| Advisory {
        code: "LONG_DOCUMENT",
        message: format!(
            "Your resume has {} pages. Resumes of 1-{ADVISORY_PAGE_LIMIT} pages work best; \
             the result may be truncated.",
            text.page_count
        ),
    })
}
