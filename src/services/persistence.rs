//! Persistence service: best-effort mirror of the shape store.
//!
//! DESIGN
//! ======
//! The canvas never awaits storage. Mutations enqueue a `PersistOp` on a
//! bounded queue with `try_send`; one background worker drains it in order and
//! applies each op to an `ElementRepository` with a short retry. A full or
//! closed queue drops the op with a warning.
//!
//! ERROR HANDLING
//! ==============
//! Availability over durability: when the store is unreachable the server runs
//! memory-only and clients never see a persistence error. Ops that still fail
//! after the retries are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::env_parse;
use crate::state::Element;

const DEFAULT_PERSIST_QUEUE_CAPACITY: usize = 8192;
const DEFAULT_PERSIST_RETRIES: usize = 3;
const DEFAULT_PERSIST_RETRY_BASE_MS: u64 = 50;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("element encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// One mirrored write.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    Save(Element),
    SaveMany(Vec<Element>),
    Delete(String),
    DeleteMany(Vec<String>),
    Clear,
}

impl PersistOp {
    fn label(&self) -> &'static str {
        match self {
            Self::Save(_) => "save",
            Self::SaveMany(_) => "save_many",
            Self::Delete(_) => "delete",
            Self::DeleteMany(_) => "delete_many",
            Self::Clear => "clear",
        }
    }
}

/// Durable element storage.
#[async_trait]
pub trait ElementRepository: Send + Sync {
    async fn save(&self, element: &Element) -> Result<(), PersistenceError>;

    async fn delete(&self, id: &str) -> Result<(), PersistenceError>;

    async fn clear(&self) -> Result<(), PersistenceError>;

    async fn load_all(&self) -> Result<Vec<Element>, PersistenceError>;

    async fn save_many(&self, elements: &[Element]) -> Result<(), PersistenceError> {
        for element in elements {
            self.save(element).await?;
        }
        Ok(())
    }

    async fn delete_many(&self, ids: &[String]) -> Result<(), PersistenceError> {
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }
}

/// Tuning knobs for the persistence worker, loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PersistConfig {
    /// Bounded channel capacity for the op queue.
    pub(crate) queue_capacity: usize,
    /// Attempts per op before it is dropped.
    pub(crate) retries: usize,
    /// Base delay in milliseconds for linear retry back-off.
    pub(crate) retry_base_ms: u64,
}

impl PersistConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            queue_capacity: env_parse("PERSIST_QUEUE_CAPACITY", DEFAULT_PERSIST_QUEUE_CAPACITY).max(1),
            retries: env_parse("PERSIST_RETRIES", DEFAULT_PERSIST_RETRIES).max(1),
            retry_base_ms: env_parse("PERSIST_RETRY_BASE_MS", DEFAULT_PERSIST_RETRY_BASE_MS),
        }
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Sending side of the persistence queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PersistHandle {
    tx: mpsc::Sender<PersistOp>,
}

impl PersistHandle {
    #[must_use]
    pub fn new(tx: mpsc::Sender<PersistOp>) -> Self {
        Self { tx }
    }

    /// Best-effort, non-blocking enqueue.
    pub fn enqueue(&self, op: PersistOp) {
        match self.tx.try_send(op) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(op)) => {
                warn!(op = op.label(), "persist queue full; dropping op");
            }
            Err(mpsc::error::TrySendError::Closed(op)) => {
                warn!(op = op.label(), "persist queue closed; dropping op");
            }
        }
    }
}

/// Mirror an op if persistence is configured. No-op otherwise.
pub fn mirror(handle: Option<&PersistHandle>, op: PersistOp) {
    if let Some(handle) = handle {
        handle.enqueue(op);
    }
}

// =============================================================================
// WORKER
// =============================================================================

/// Spawn the persistence worker and return its queue handle.
pub fn spawn_persistence_worker(repo: Arc<dyn ElementRepository>) -> (PersistHandle, JoinHandle<()>) {
    spawn_persistence_worker_with(repo, PersistConfig::from_env())
}

pub(crate) fn spawn_persistence_worker_with(
    repo: Arc<dyn ElementRepository>,
    config: PersistConfig,
) -> (PersistHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<PersistOp>(config.queue_capacity);
    info!(
        queue_capacity = config.queue_capacity,
        retries = config.retries,
        retry_base_ms = config.retry_base_ms,
        "persistence worker configured"
    );

    let handle = tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            apply_with_retry(repo.as_ref(), &op, config).await;
        }
        info!("persistence worker stopped");
    });

    (PersistHandle::new(tx), handle)
}

async fn apply_with_retry(repo: &dyn ElementRepository, op: &PersistOp, config: PersistConfig) {
    for attempt in 1..=config.retries {
        match apply(repo, op).await {
            Ok(()) => return,
            Err(e) if attempt < config.retries => {
                warn!(error = %e, op = op.label(), attempt, total = config.retries, "persist op failed; retrying");
                tokio::time::sleep(Duration::from_millis((attempt as u64) * config.retry_base_ms)).await;
            }
            Err(e) => {
                warn!(error = %e, op = op.label(), "persist op failed after retries; dropping");
            }
        }
    }
}

async fn apply(repo: &dyn ElementRepository, op: &PersistOp) -> Result<(), PersistenceError> {
    match op {
        PersistOp::Save(element) => repo.save(element).await,
        PersistOp::SaveMany(elements) => repo.save_many(elements).await,
        PersistOp::Delete(id) => repo.delete(id).await,
        PersistOp::DeleteMany(ids) => repo.delete_many(ids).await,
        PersistOp::Clear => repo.clear().await,
    }
}

// =============================================================================
// POSTGRES
// =============================================================================

/// Postgres-backed repository. One JSONB row per element.
#[derive(Clone)]
pub struct PgElementRepository {
    pool: PgPool,
}

impl PgElementRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ElementRepository for PgElementRepository {
    async fn save(&self, element: &Element) -> Result<(), PersistenceError> {
        let body = serde_json::to_value(element)?;
        sqlx::query(
            "INSERT INTO canvas_elements (id, kind, element, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET \
                 kind = EXCLUDED.kind, element = EXCLUDED.element, updated_at = EXCLUDED.updated_at",
        )
        .bind(&element.id)
        .bind(element.kind())
        .bind(&body)
        .bind(element.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_many(&self, elements: &[Element]) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;
        for element in elements {
            let body = serde_json::to_value(element)?;
            sqlx::query(
                "INSERT INTO canvas_elements (id, kind, element, updated_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (id) DO UPDATE SET \
                     kind = EXCLUDED.kind, element = EXCLUDED.element, updated_at = EXCLUDED.updated_at",
            )
            .bind(&element.id)
            .bind(element.kind())
            .bind(&body)
            .bind(element.timestamp)
            .execute(tx.as_mut())
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM canvas_elements WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_many(&self, ids: &[String]) -> Result<(), PersistenceError> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("DELETE FROM canvas_elements WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM canvas_elements")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Element>, PersistenceError> {
        let rows = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT element FROM canvas_elements ORDER BY updated_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut elements = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<Element>(row) {
                Ok(element) => elements.push(element),
                Err(e) => warn!(error = %e, "skipping undecodable stored element"),
            }
        }
        Ok(elements)
    }
}

/// Connect, migrate, and build the Postgres repository.
///
/// # Errors
///
/// Returns an error if the connection or migrations fail.
pub async fn connect_repository(database_url: &str) -> Result<PgElementRepository, PersistenceError> {
    let pool = crate::db::init_pool(database_url).await?;
    Ok(PgElementRepository::new(pool))
}

/// Load every stored element, logging and returning nothing on failure.
pub async fn hydrate(repo: &dyn ElementRepository) -> Vec<Element> {
    match repo.load_all().await {
        Ok(elements) => {
            info!(count = elements.len(), "hydrated canvas from persistence");
            elements
        }
        Err(e) => {
            warn!(error = %e, "canvas hydration failed; starting empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
