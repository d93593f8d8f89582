//! Enhancement pipeline — one linear run per click.
//!
//! Flow: gate (presence, type, size) → extract → gate (emptiness, page advisory)
//!       → build request/prompt → completion call.
//!
//! Every validation-class failure is raised before the completion backend is
//! touched. Nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::enhancement::validation::{
    check_document, check_not_empty, check_size, page_advisory, Advisory,
};
use crate::errors::AppError;
use crate::extraction::{extract_text, DocumentReader};
use crate::llm_client::CompletionBackend;
use crate::models::document::UploadedDocument;
use crate::models::enhancement::{EnhancementRequest, EnhancementResult, JobTarget};
use crate::session::Stage;

/// Process-wide limits for a run, taken from [`Config`] at startup.
#[derive(Debug, Clone)]
pub struct PipelineLimits {
    pub max_upload_bytes: usize,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl PipelineLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            max_output_tokens: config.max_output_tokens,
            timeout: config.request_timeout,
        }
    }
}

/// Collaborators for a run.
pub struct Pipeline<'a> {
    pub reader: &'a dyn DocumentReader,
    pub backend: &'a dyn CompletionBackend,
    pub limits: &'a PipelineLimits,
}

/// Receives stage transitions as the run progresses.
#[async_trait]
pub trait StageObserver: Send + Sync {
    async fn on_stage(&self, stage: Stage);
}

/// Observer for callers that do not track progress.
pub struct NoopObserver;

#[async_trait]
impl StageObserver for NoopObserver {
    async fn on_stage(&self, _stage: Stage) {}
}

/// A successful run: the model output plus any non-fatal advisories.
#[derive(Debug, Clone)]
pub struct Enhanced {
    pub text: String,
    pub advisories: Vec<Advisory>,
}

impl Enhanced {
    pub fn to_result(&self) -> EnhancementResult {
        EnhancementResult::Succeeded {
            text: self.text.clone(),
        }
    }
}

impl Pipeline<'_> {
    pub async fn run(
        &self,
        interaction_id: Uuid,
        document: &UploadedDocument,
        target: &JobTarget,
        observer: &dyn StageObserver,
    ) -> Result<Enhanced, AppError> {
        // Step 1: presence, type and size, before any parse work
        check_document(document)?;
        check_size(document.declared_size, self.limits.max_upload_bytes)?;

        // Step 2: extract
        let pages = self.reader.read_pages(document.bytes.clone()).await?;
        let extracted = extract_text(&pages)?;
        check_not_empty(&extracted)?;

        let mut advisories = Vec::new();
        if let Some(advisory) = page_advisory(&extracted) {
            warn!("Interaction {interaction_id}: {}", advisory.message);
            advisories.push(advisory);
        }
        observer.on_stage(Stage::Validated).await;
        info!(
            "Interaction {interaction_id}: extracted {} chars from {}/{} pages",
            extracted.text.len(),
            extracted.pages_with_text,
            extracted.page_count
        );

        // Step 3: build the immutable request (and its prompt)
        let request = EnhancementRequest::build(
            extracted.text,
            target.clone(),
            self.limits.max_output_tokens,
            self.limits.timeout,
        );
        observer.on_stage(Stage::Prompted).await;

        // Step 4: the only suspension point that waits on the network
        observer.on_stage(Stage::Requested).await;
        info!(
            "Interaction {interaction_id}: requesting enhancement (job_title={:?}, company={:?}, resume_chars={})",
            request.target().job_title(),
            request.target().company(),
            request.resume_text().len()
        );
        let text = self.backend.complete(&request).await?;

        info!(
            "Interaction {interaction_id}: enhancement complete ({} chars)",
            text.len()
        );
        Ok(Enhanced { text, advisories })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use bytes::Bytes;

    use crate::errors::ErrorKind;

    /// Reader that returns fixed pages, or fails like an unparseable PDF.
    pub(crate) struct FakeReader {
        pub pages: Option<Vec<String>>,
        pub calls: AtomicUsize,
    }

    impl FakeReader {
        pub fn with_pages(pages: &[&str]) -> Self {
            Self {
                pages: Some(pages.iter().map(|p| p.to_string()).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn unreadable() -> Self {
            Self {
                pages: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentReader for FakeReader {
        async fn read_pages(&self, _bytes: Bytes) -> Result<Vec<String>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .clone()
                .ok_or_else(|| AppError::UnreadableDocument("invalid xref table".into()))
        }
    }

    /// Backend that records every call and replies with a canned outcome.
    pub(crate) struct CountingBackend {
        pub calls: AtomicUsize,
        pub reply: fn() -> Result<String, AppError>,
        pub last_prompt: Mutex<Option<String>>,
    }

    impl CountingBackend {
        pub fn replying(reply: fn() -> Result<String, AppError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply,
                last_prompt: Mutex::new(None),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for CountingBackend {
        async fn complete(&self, request: &EnhancementRequest) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(request.prompt().to_string());
            (self.reply)()
        }
    }

    struct RecordingObserver(Mutex<Vec<Stage>>);

    #[async_trait]
    impl StageObserver for RecordingObserver {
        async fn on_stage(&self, stage: Stage) {
            self.0.lock().unwrap().push(stage);
        }
    }

    fn limits() -> PipelineLimits {
        PipelineLimits {
            max_upload_bytes: 3 * 1024 * 1024,
            max_output_tokens: 2000,
            timeout: Duration::from_secs(30),
        }
    }

    fn pdf(size: usize) -> UploadedDocument {
        UploadedDocument::new(
            Bytes::from(vec![b'%'; size]),
            Some("resume.pdf".into()),
            Some("application/pdf".into()),
        )
    }

    fn improved() -> Result<String, AppError> {
        Ok("IMPROVED TEXT".to_string())
    }

    async fn run(
        reader: &FakeReader,
        backend: &CountingBackend,
        document: &UploadedDocument,
        target: &JobTarget,
    ) -> Result<Enhanced, AppError> {
        let limits = limits();
        let pipeline = Pipeline {
            reader,
            backend,
            limits: &limits,
        };
        pipeline
            .run(Uuid::new_v4(), document, target, &NoopObserver)
            .await
    }

    #[tokio::test]
    async fn test_success_returns_backend_text_verbatim() {
        let reader = FakeReader::with_pages(&["Jane Doe\nRust developer\n"]);
        let backend = CountingBackend::replying(improved);
        let target = JobTarget::new(Some("Software Engineer".into()), None);

        let enhanced = run(&reader, &backend, &pdf(50 * 1024), &target)
            .await
            .unwrap();

        assert_eq!(enhanced.text, "IMPROVED TEXT");
        assert!(enhanced.advisories.is_empty());
        assert_eq!(backend.call_count(), 1);
        let prompt = backend.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Software Engineer"));
        assert!(prompt.contains("Rust developer"));
    }

    #[tokio::test]
    async fn test_oversized_upload_never_reaches_backend_or_parser() {
        let reader = FakeReader::with_pages(&["text"]);
        let backend = CountingBackend::replying(improved);

        let err = run(&reader, &backend, &pdf(4_000_000), &JobTarget::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DocumentTooLarge { size: 4_000_000, .. }));
        assert_eq!(backend.call_count(), 0);
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0, "size check precedes extraction");
    }

    #[tokio::test]
    async fn test_all_blank_pages_fail_before_network() {
        let reader = FakeReader::with_pages(&["", "  \n\n", "\t"]);
        let backend = CountingBackend::replying(improved);

        let err = run(&reader, &backend, &pdf(1024), &JobTarget::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::EmptyDocument));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_pdf_fails_before_network() {
        let reader = FakeReader::unreadable();
        let backend = CountingBackend::replying(improved);

        let err = run(&reader, &backend, &pdf(1024), &JobTarget::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnreadableDocument);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_long_document_gets_advisory_but_continues() {
        let reader = FakeReader::with_pages(&["one", "two", "three", "four"]);
        let backend = CountingBackend::replying(improved);

        let enhanced = run(&reader, &backend, &pdf(1024), &JobTarget::default())
            .await
            .unwrap();

        assert_eq!(enhanced.advisories.len(), 1);
        assert!(enhanced.advisories[0].message.contains("4 pages"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_backend_errors_pass_through_unchanged() {
        let reader = FakeReader::with_pages(&["Jane Doe"]);
        let backend = CountingBackend::replying(|| {
            Err(AppError::MalformedResponse("'choices' list is empty".into()))
        });

        let err = run(&reader, &backend, &pdf(1024), &JobTarget::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::MalformedResponse(_)));
        assert_eq!(backend.call_count(), 1, "no retry after a failed call");
    }

    #[tokio::test]
    async fn test_stages_reported_in_order() {
        let reader = FakeReader::with_pages(&["Jane Doe"]);
        let backend = CountingBackend::replying(improved);
        let limits = limits();
        let observer = RecordingObserver(Mutex::new(Vec::new()));
        let pipeline = Pipeline {
            reader: &reader,
            backend: &backend,
            limits: &limits,
        };

        pipeline
            .run(Uuid::new_v4(), &pdf(1024), &JobTarget::default(), &observer)
            .await
            .unwrap();

        assert_eq!(
            *observer.0.lock().unwrap(),
            vec![Stage::Validated, Stage::Prompted, Stage::Requested]
        );
    }
}
