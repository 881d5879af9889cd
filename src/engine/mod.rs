
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::capabilities::{AnswerSynthesizer, Embedder};
use crate::store::VectorStore;
use crate::{GraftError, Result};

pub const DEFAULT_TOP_K: usize = 5;

/// Answers natural-language queries against one loaded vector store.
///
/// The engine holds the store by shared reference; rebuilding the index
/// produces a new engine rather than mutating this one.
pub struct QueryEngine {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    default_top_k: usize,
}

/// An answer together with the nodes that grounded it
#[derive(Debug, Clone)]
pub struct AnsweredQuery {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Provenance record for one retrieved node
#[derive(Debug, Clone)]
pub struct SourceRef {
    pub node_id: String,
    pub source_id: String,
    pub score: f32,
    pub text: String,
}

impl QueryEngine {
    #[inline]
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
        default_top_k: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            synthesizer,
            default_top_k,
        }
    }

    /// The store this engine answers against
    #[inline]
    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Answer `query` from the `top_k` most similar nodes (engine default
    /// when `None`).
    ///
    /// Blank queries are rejected before any embedding call. Capability
    /// failures propagate unmodified.
    #[inline]
    pub fn answer(&self, query: &str, top_k: Option<usize>) -> Result<AnsweredQuery> {
        if query.trim().is_empty() {
            return Err(GraftError::EmptyQuery);
        }
        let top_k = top_k.unwrap_or(self.default_top_k);

        debug!("Answering query with top_k={}", top_k);

        let query_vector = self.embedder.embed(query)?;
        let results = self.store.search(&query_vector, top_k)?;

        let context: Vec<&str> = results.iter().map(|r| r.node.text.as_str()).collect();
        let answer = self.synthesizer.synthesize(query, &context)?;

        let sources = results
            .into_iter()
            .map(|r| SourceRef {
                node_id: r.node.id,
                source_id: r.node.source_id,
                score: r.score,
                text: r.node.text,
            })
            .collect();

        Ok(AnsweredQuery { answer, sources })
    }
}

/// Single-slot registry for the process-wide active engine.
///
/// The slot is swapped atomically on every successful build or load, so a
/// concurrent reader always observes either the previous engine or the fully
/// built new one.
#[derive(Default)]
pub struct ActiveEngine {
    slot: RwLock<Option<Arc<QueryEngine>>>,
}

impl ActiveEngine {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently bound engine, if any
    #[inline]
    pub fn get_active(&self) -> Option<Arc<QueryEngine>> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Bind a new engine, replacing any previous one
    #[inline]
    pub fn set_active(&self, engine: Arc<QueryEngine>) {
        *self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(engine);
    }
}
