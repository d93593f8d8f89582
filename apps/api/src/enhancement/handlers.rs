//! Axum route handlers for the Enhancement API.

use async_trait::async_trait;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::enhancement::pipeline::{Pipeline, StageObserver};
use crate::enhancement::presenter::{
    download_response, present, DownloadInfo, EnhanceResponse, Presentation,
};
use crate::enhancement::validation::Advisory;
use crate::errors::{AppError, ErrorKind};
use crate::models::document::UploadedDocument;
use crate::models::enhancement::{DownloadArtifact, EnhancementResult, JobTarget};
use crate::session::{SessionStore, Stage, StoredResult, UploadOutcome};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SessionCreatedResponse {
    pub interaction_id: Uuid,
    pub stage: Stage,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub interaction_id: Uuid,
    pub stage: Stage,
    /// False when the same file was uploaded again and nothing was reset.
    pub changed: bool,
    pub file_name: Option<String>,
    pub size: usize,
}

#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub file_name: Option<String>,
    pub size: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub interaction_id: Uuid,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub document: Option<DocumentSummary>,
    /// Job title and company of the run whose result is shown.
    pub target: Option<JobTarget>,
    pub improved_text: Option<String>,
    pub download: Option<DownloadInfo>,
    pub error: Option<SessionError>,
    pub advisories: Vec<Advisory>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Fields of the multipart upload form.
struct UploadForm {
    document: Option<UploadedDocument>,
    target: JobTarget,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/enhance
///
/// One-shot: multipart `file`, optional `job_title` and `company`. Runs the
/// whole pipeline in a fresh interaction.
pub async fn handle_enhance(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EnhanceResponse>, AppError> {
    let form = read_upload_form(multipart, state.limits.max_upload_bytes).await?;
    let document = form.document.ok_or(AppError::MissingDocument)?;

    // The document lives only for this request; the session keeps the result.
    let (interaction_id, ticket) = state.sessions.create_with_run().await;
    execute_run(&state, interaction_id, ticket, &document, form.target).await
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionCreatedResponse>) {
    let interaction_id = state.sessions.create().await;
    (
        StatusCode::CREATED,
        Json(SessionCreatedResponse {
            interaction_id,
            stage: Stage::Idle,
        }),
    )
}

/// POST /api/v1/sessions/:id/upload
///
/// Stores the document for later clicks. Re-uploading identical bytes is a no-op.
pub async fn handle_upload(
    State(state): State<AppState>,
    Path(interaction_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let form = read_upload_form(multipart, state.limits.max_upload_bytes).await?;
    let document = form.document.ok_or(AppError::MissingDocument)?;
    let file_name = document.file_name.clone();
    let size = document.declared_size;

    let outcome = state.sessions.upload(interaction_id, document).await?;
    if outcome == UploadOutcome::Unchanged {
        debug!("Interaction {interaction_id}: same file uploaded again, ignoring");
    }
    let stage = state
        .sessions
        .inspect(interaction_id, |ctx| ctx.stage())
        .await?;

    Ok(Json(UploadResponse {
        interaction_id,
        stage,
        changed: outcome == UploadOutcome::Stored,
        file_name,
        size,
    }))
}

/// POST /api/v1/sessions/:id/enhance
///
/// The button click: runs the pipeline once on the stored document.
pub async fn handle_session_enhance(
    State(state): State<AppState>,
    Path(interaction_id): Path<Uuid>,
    body: Option<Json<JobTarget>>,
) -> Result<Json<EnhanceResponse>, AppError> {
    let target = body.map(|Json(t)| t.normalized()).unwrap_or_default();
    let (ticket, document) = state.sessions.begin_run(interaction_id).await?;
    execute_run(&state, interaction_id, ticket, &document, target).await
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(interaction_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let view = state
        .sessions
        .inspect(interaction_id, |ctx| {
            let stored = ctx.result();
            let presentation = stored.map(|s| present(&s.result, s.target.job_title()));

            let mut view = SessionView {
                interaction_id,
                stage: ctx.stage(),
                created_at: ctx.created_at,
                document: ctx.document().map(|d| DocumentSummary {
                    file_name: d.file_name.clone(),
                    size: d.declared_size,
                }),
                target: stored.map(|s| s.target.clone()),
                improved_text: None,
                download: None,
                error: None,
                advisories: stored.map(|s| s.advisories.clone()).unwrap_or_default(),
                finished_at: stored.map(|s| s.finished_at),
            };

            match presentation {
                Some(Presentation::Download { artifact }) => {
                    view.download = Some(DownloadInfo::new(interaction_id, &artifact));
                    view.improved_text = Some(artifact.content);
                }
                Some(Presentation::Error { kind, message }) => {
                    view.error = Some(SessionError { kind, message });
                }
                None => {}
            }
            view
        })
        .await?;

    Ok(Json(view))
}

/// GET /api/v1/sessions/:id/download
///
/// The last successful result as a plain-text attachment.
pub async fn handle_download(
    State(state): State<AppState>,
    Path(interaction_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let presentation = state
        .sessions
        .inspect(interaction_id, |ctx| {
            ctx.result()
                .map(|s| present(&s.result, s.target.job_title()))
        })
        .await?;

    match presentation {
        Some(Presentation::Download { artifact }) => download_response(artifact),
        _ => Err(AppError::NotFound(format!(
            "No enhanced resume available for interaction {interaction_id}"
        ))),
    }
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(interaction_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.remove(interaction_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ────────────────────────────────────────────────────────────────────────────
// Run execution
// ────────────────────────────────────────────────────────────────────────────

/// Publishes stage transitions of one run into the session store.
struct SessionProgress<'a> {
    sessions: &'a SessionStore,
    interaction_id: Uuid,
    ticket: u64,
}

#[async_trait]
impl StageObserver for SessionProgress<'_> {
    async fn on_stage(&self, stage: Stage) {
        self.sessions
            .advance(self.interaction_id, self.ticket, stage)
            .await;
    }
}

async fn execute_run(
    state: &AppState,
    interaction_id: Uuid,
    ticket: u64,
    document: &UploadedDocument,
    target: JobTarget,
) -> Result<Json<EnhanceResponse>, AppError> {
    info!("Interaction {interaction_id}: run {ticket} started");

    let pipeline = Pipeline {
        reader: state.reader.as_ref(),
        backend: state.llm.as_ref(),
        limits: &state.limits,
    };
    let progress = SessionProgress {
        sessions: &state.sessions,
        interaction_id,
        ticket,
    };
    let outcome = pipeline
        .run(interaction_id, document, &target, &progress)
        .await;

    let (result, advisories) = match &outcome {
        Ok(enhanced) => (enhanced.to_result(), enhanced.advisories.clone()),
        Err(e) => (EnhancementResult::failed(e), Vec::new()),
    };
    let stored = StoredResult {
        result,
        target: target.clone(),
        advisories,
        finished_at: Utc::now(),
    };
    if !state.sessions.finish(interaction_id, ticket, stored).await {
        warn!("Interaction {interaction_id}: run {ticket} was superseded, result not stored");
    }

    // A failure halts here; no download is offered.
    let enhanced = outcome.map_err(|e| {
        if e.is_validation() {
            info!("Interaction {interaction_id}: rejected before completion call: {e}");
        }
        e
    })?;
    let artifact = DownloadArtifact::for_job_title(target.job_title(), enhanced.text);

    Ok(Json(EnhanceResponse {
        interaction_id,
        download: DownloadInfo::new(interaction_id, &artifact),
        improved_text: artifact.content,
        advisories: enhanced.advisories,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Multipart parsing
// ────────────────────────────────────────────────────────────────────────────

async fn read_upload_form(mut multipart: Multipart, limit: usize) -> Result<UploadForm, AppError> {
    let mut document = None;
    let mut job_title = None;
    let mut company = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, 0, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(String::from);
                let content_type = field.content_type().map(String::from);
                let bytes = read_file_field(&mut field, limit).await?;
                document = Some(UploadedDocument::new(bytes, file_name, content_type));
            }
            "job_title" => {
                job_title = Some(field.text().await.map_err(|e| multipart_error(e, 0, limit))?)
            }
            "company" => {
                company = Some(field.text().await.map_err(|e| multipart_error(e, 0, limit))?)
            }
            other => debug!("Ignoring unknown form field '{other}'"),
        }
    }

    Ok(UploadForm {
        document,
        target: JobTarget::new(job_title, company),
    })
}

/// Buffers the file field up to `limit` bytes. Past the limit the rest is
/// only counted, so the error reports the real size and nothing is parsed.
async fn read_file_field(
    field: &mut axum::extract::multipart::Field<'_>,
    limit: usize,
) -> Result<bytes::Bytes, AppError> {
    let mut buffer = BytesMut::new();
    let mut total = 0_usize;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(move |e| multipart_error(e, total, limit))?
    {
        total = total.saturating_add(chunk.len());
        if total <= limit {
            buffer.extend_from_slice(&chunk);
        }
    }

    if total > limit {
        return Err(AppError::DocumentTooLarge { size: total, limit });
    }
    Ok(buffer.freeze())
}

/// Maps a multipart read failure. A body cut off by the transport limit, or a
/// stream that breaks after the file already passed the ceiling, is reported
/// as too large; `received` is how much of the file had arrived.
fn multipart_error(
    e: axum::extract::multipart::MultipartError,
    received: usize,
    limit: usize,
) -> AppError {
    if received > limit || hit_body_limit(&e) {
        return cut_off(received, limit);
    }
    AppError::Validation(format!("Invalid multipart upload: {}", e.body_text()))
}

/// The upload stopped before its full size was known; report at least one
/// byte over the ceiling.
fn cut_off(received: usize, limit: usize) -> AppError {
    AppError::DocumentTooLarge {
        size: received.max(limit.saturating_add(1)),
        limit,
    }
}

/// Walks the source chain looking for the body-limit error; axum nests it a
/// few layers deep inside the multipart error.
fn hit_body_limit(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(e);
    while let Some(err) = current {
        if err.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        current = err.source();
    }
    false
}
