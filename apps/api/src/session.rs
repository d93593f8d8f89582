//! Per-interaction state: the upload/click state machine and the result slot.
//!
//! Each interaction owns one [`InteractionContext`]. Runs take a ticket when
//! they start; only the most recently started run may write the result slot,
//! so a stale response arriving late never replaces a fresher one. In-flight
//! calls are never cancelled.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::enhancement::validation::Advisory;
use crate::errors::AppError;
use crate::models::document::UploadedDocument;
use crate::models::enhancement::{EnhancementResult, JobTarget};

/// Interactions idle for longer than this are dropped by the next prune.
const SESSION_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    FileReceived,
    Validated,
    Prompted,
    Requested,
    Succeeded,
    Failed,
}

/// Result of the most recent run allowed to write.
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub result: EnhancementResult,
    pub target: JobTarget,
    pub advisories: Vec<Advisory>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored,
    /// Same bytes as the current document; nothing was reset.
    Unchanged,
}

/// Explicit state for one user interaction. Never shared between interactions.
#[derive(Debug)]
pub struct InteractionContext {
    pub created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    stage: Stage,
    document: Option<UploadedDocument>,
    latest_ticket: u64,
    result: Option<StoredResult>,
}

impl InteractionContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_active: now,
            stage: Stage::Idle,
            document: None,
            latest_ticket: 0,
            result: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn result(&self) -> Option<&StoredResult> {
        self.result.as_ref()
    }

    pub fn document(&self) -> Option<&UploadedDocument> {
        self.document.as_ref()
    }

    /// Stores a new document. Identical content is a no-op; a different file
    /// clears the result slot and supersedes any run still in flight.
    pub fn receive_document(&mut self, document: UploadedDocument, now: DateTime<Utc>) -> UploadOutcome {
        self.last_active = now;
        if self
            .document
            .as_ref()
            .is_some_and(|current| current.same_content(&document))
        {
            return UploadOutcome::Unchanged;
        }

        self.document = Some(document);
        self.result = None;
        self.latest_ticket += 1;
        self.stage = Stage::FileReceived;
        UploadOutcome::Stored
    }

    /// Starts a run (one per click) and returns its ticket with a copy of the document.
    pub fn begin_run(&mut self, now: DateTime<Utc>) -> Result<(u64, UploadedDocument), AppError> {
        let document = self.document.clone().ok_or(AppError::MissingDocument)?;
        Ok((self.begin_transient_run(now), document))
    }

    /// Starts a run on a document the caller holds. The bytes are never
    /// stored here; only the result lands in the slot.
    pub fn begin_transient_run(&mut self, now: DateTime<Utc>) -> u64 {
        self.last_active = now;
        self.latest_ticket += 1;
        self.stage = Stage::FileReceived;
        self.latest_ticket
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        ticket == self.latest_ticket
    }

    /// Moves the displayed stage forward. Ignored for superseded runs.
    pub fn advance(&mut self, ticket: u64, stage: Stage) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.stage = stage;
        true
    }

    /// Writes the result slot if `ticket` is still the latest run.
    pub fn finish(&mut self, ticket: u64, result: StoredResult) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.last_active = result.finished_at;
        self.stage = if result.result.is_success() {
            Stage::Succeeded
        } else {
            Stage::Failed
        };
        self.result = Some(result);
        true
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_active > Duration::minutes(SESSION_TTL_MINUTES)
    }
}

/// In-memory registry of live interactions, shared through `AppState`.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, InteractionContext>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> Uuid {
        self.insert(InteractionContext::new(Utc::now())).await
    }

    /// Creates an interaction with its first run already started, for callers
    /// that keep the document themselves.
    pub async fn create_with_run(&self) -> (Uuid, u64) {
        let now = Utc::now();
        let mut ctx = InteractionContext::new(now);
        let ticket = ctx.begin_transient_run(now);
        (self.insert(ctx).await, ticket)
    }

    async fn insert(&self, ctx: InteractionContext) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.inner.write().await;
        drop_expired(&mut sessions, ctx.created_at);
        sessions.insert(id, ctx);
        info!("Interaction {id} created");
        id
    }

    /// Drops every interaction idle past the TTL. Returns how many went.
    pub async fn prune_expired(&self) -> usize {
        self.prune_expired_at(Utc::now()).await
    }

    async fn prune_expired_at(&self, now: DateTime<Utc>) -> usize {
        drop_expired(&mut *self.inner.write().await, now)
    }

    /// Prunes expired interactions every `period` for the life of the process.
    pub fn spawn_pruner(&self, period: std::time::Duration) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                store.prune_expired().await;
            }
        });
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), AppError> {
        self.inner
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    pub async fn upload(&self, id: Uuid, document: UploadedDocument) -> Result<UploadOutcome, AppError> {
        let mut sessions = self.inner.write().await;
        let ctx = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        Ok(ctx.receive_document(document, Utc::now()))
    }

    pub async fn begin_run(&self, id: Uuid) -> Result<(u64, UploadedDocument), AppError> {
        let mut sessions = self.inner.write().await;
        let ctx = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        ctx.begin_run(Utc::now())
    }

    pub async fn advance(&self, id: Uuid, ticket: u64, stage: Stage) {
        if let Some(ctx) = self.inner.write().await.get_mut(&id) {
            ctx.advance(ticket, stage);
        }
    }

    /// Returns false when the run was superseded or the interaction is gone.
    pub async fn finish(&self, id: Uuid, ticket: u64, result: StoredResult) -> bool {
        match self.inner.write().await.get_mut(&id) {
            Some(ctx) => ctx.finish(ticket, result),
            None => false,
        }
    }

    /// Runs `f` against the interaction under a read lock.
    pub async fn inspect<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&InteractionContext) -> T,
    ) -> Result<T, AppError> {
        let sessions = self.inner.read().await;
        sessions.get(&id).map(f).ok_or_else(|| not_found(id))
    }
}

fn drop_expired(sessions: &mut HashMap<Uuid, InteractionContext>, now: DateTime<Utc>) -> usize {
    let before = sessions.len();
    sessions.retain(|_, ctx| !ctx.is_expired(now));
    let dropped = before - sessions.len();
    if dropped > 0 {
        debug!("Dropped {dropped} expired interactions");
    }
    dropped
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Interaction {id} not found"))
}
