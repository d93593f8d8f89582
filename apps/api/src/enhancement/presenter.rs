//! Result Presenter — turns a run's result into either a download or an error.

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use uuid::Uuid;

use crate::enhancement::validation::Advisory;
use crate::errors::{AppError, ErrorKind};
use crate::models::enhancement::{DownloadArtifact, EnhancementResult};

/// What the client sees for one run. Exactly one branch per run.
#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    Download { artifact: DownloadArtifact },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

pub fn present(result: &EnhancementResult, job_title: Option<&str>) -> Presentation {
    match result {
        EnhancementResult::Succeeded { text } => Presentation::Download {
            artifact: DownloadArtifact::for_job_title(job_title, text.clone()),
        },
        EnhancementResult::Failed { kind, message } => Presentation::Error {
            kind: *kind,
            message: message.clone(),
        },
    }
}

#[derive(Debug, Serialize)]
pub struct DownloadInfo {
    pub file_name: String,
    pub mime_type: &'static str,
    pub url: String,
}

impl DownloadInfo {
    pub fn new(interaction_id: Uuid, artifact: &DownloadArtifact) -> Self {
        Self {
            file_name: artifact.file_name.clone(),
            mime_type: artifact.mime_type,
            url: download_url(interaction_id),
        }
    }
}

/// Body of a successful enhance call.
#[derive(Debug, Serialize)]
pub struct EnhanceResponse {
    pub interaction_id: Uuid,
    pub improved_text: String,
    pub download: DownloadInfo,
    pub advisories: Vec<Advisory>,
}

pub fn download_url(interaction_id: Uuid) -> String {
    format!("/api/v1/sessions/{interaction_id}/download")
}

/// Serves the artifact as a `text/plain` attachment. The body is the model
/// output with nothing added.
pub fn download_response(artifact: DownloadArtifact) -> Result<Response, AppError> {
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        artifact.header_file_name()
    ))
    .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid download file name: {e}")))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.content,
    )
        .into_response())
}
