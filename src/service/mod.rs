#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::capabilities::{AnswerSynthesizer, Embedder};
use crate::config::Config;
use crate::engine::{ActiveEngine, AnsweredQuery, QueryEngine};
use crate::index::IndexManager;
use crate::{GraftError, Result};

/// Externally observable state of the service's index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    Ready { nodes: usize, dimension: usize },
}

/// Outcome of a successful document ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source_id: String,
    pub nodes_indexed: usize,
    pub dimension: usize,
}

/// Process-level orchestration of the indexing and query core.
///
/// Holds exactly one active store/engine pair, rebound on every successful
/// build or load. Builds are serialized by a mutex and bounded by a timeout;
/// queries read the active slot concurrently and always see either the old
/// engine or the fully built new one.
pub struct RagService {
    config: Config,
    embedder: Arc<dyn Embedder>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    manager: IndexManager,
    active: ActiveEngine,
    build_lock: Mutex<()>,
}

impl RagService {
    #[inline]
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
    ) -> Self {
        let manager = IndexManager::new(
            config.snapshot_dir(),
            config.chunking,
            Arc::clone(&embedder),
        );
        Self {
            config,
            embedder,
            synthesizer,
            manager,
            active: ActiveEngine::new(),
            build_lock: Mutex::new(()),
        }
    }

    /// Bind an engine to a previously persisted snapshot, if one exists.
    ///
    /// Returns whether an engine was bound. A missing snapshot is the normal
    /// first-run state, not an error.
    #[inline]
    pub fn load_existing(&self) -> Result<bool> {
        match self.manager.load_index()? {
            Some(store) => {
                self.bind(store);
                info!("Bound query engine to existing snapshot");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Chunk, embed, index, and persist `text`, then rebind the active
    /// engine to the new store.
    ///
    /// Only one build runs at a time. A failed or timed-out build leaves the
    /// previously bound engine (and the previously persisted snapshot)
    /// unchanged.
    #[inline]
    pub async fn ingest(&self, text: String, source_id: String) -> Result<IngestReport> {
        let _guard = self.build_lock.lock().await;

        let manager = self.manager.clone();
        let build_source = source_id.clone();
        let budget = Duration::from_secs(self.config.retrieval.build_timeout_secs);

        // Only the embedding-dominated phase runs under the timeout; an
        // abandoned build is dropped before it can touch the snapshot.
        let handle =
            tokio::task::spawn_blocking(move || manager.build_store(&text, &build_source));

        let store = match timeout(budget, handle).await {
            Ok(joined) => joined.map_err(|e| GraftError::Other(anyhow!("build task failed: {e}")))??,
            Err(_) => {
                warn!(
                    "Index build for '{}' exceeded {}s; prior index remains authoritative",
                    source_id,
                    budget.as_secs()
                );
                return Err(GraftError::BuildTimeout(budget.as_secs()));
            }
        };

        store.persist(self.manager.snapshot_dir())?;

        let report = IngestReport {
            source_id,
            nodes_indexed: store.len(),
            dimension: store.dimension().unwrap_or_default(),
        };
        self.bind(store);

        info!(
            "Ingested '{}': {} nodes indexed",
            report.source_id, report.nodes_indexed
        );
        Ok(report)
    }

    /// Answer a query against the active engine.
    ///
    /// Fails fast with [`GraftError::EngineNotReady`] until the first
    /// successful build or load.
    #[inline]
    pub fn query(&self, text: &str, top_k: Option<usize>) -> Result<AnsweredQuery> {
        let engine = self.active.get_active().ok_or(GraftError::EngineNotReady)?;
        engine.answer(text, top_k)
    }

    /// Current externally observable index state
    #[inline]
    pub fn state(&self) -> IndexState {
        match self.active.get_active() {
            Some(engine) => IndexState::Ready {
                nodes: engine.store().len(),
                dimension: engine.store().dimension().unwrap_or_default(),
            },
            None => IndexState::Uninitialized,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn bind(&self, store: crate::store::VectorStore) {
        let engine = QueryEngine::new(
            Arc::new(store),
            Arc::clone(&self.embedder),
            Arc::clone(&self.synthesizer),
            self.config.retrieval.top_k,
        );
        self.active.set_active(Arc::new(engine));
    }
}
