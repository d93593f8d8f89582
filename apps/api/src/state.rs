use std::sync::Arc;

use crate::config::Config;
use crate::enhancement::pipeline::PipelineLimits;
use crate::extraction::DocumentReader;
use crate::llm_client::CompletionBackend;
use crate::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Upload and completion limits derived from `config` at startup.
    pub limits: PipelineLimits,
    /// Text extractor. Default: `PdfTextReader`.
    pub reader: Arc<dyn DocumentReader>,
    /// Completion client. Default: `LlmClient` against the configured endpoint.
    pub llm: Arc<dyn CompletionBackend>,
    pub sessions: SessionStore,
}
