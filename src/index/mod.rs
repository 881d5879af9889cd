
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::capabilities::Embedder;
use crate::chunker::{ChunkParams, chunk};
use crate::store::VectorStore;
use crate::{GraftError, Result};

/// Orchestrates the build pipeline (chunk, embed, insert, persist) and the
/// load lifecycle of the vector store.
#[derive(Clone)]
pub struct IndexManager {
    snapshot_dir: PathBuf,
    params: ChunkParams,
    embedder: Arc<dyn Embedder>,
}

impl IndexManager {
    #[inline]
    pub fn new(snapshot_dir: PathBuf, params: ChunkParams, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            snapshot_dir,
            params,
            embedder,
        }
    }

    #[inline]
    pub fn snapshot_dir(&self) -> &PathBuf {
        &self.snapshot_dir
    }

    /// Build a fresh index from `text` and persist it, atomically replacing
    /// any prior snapshot.
    ///
    /// Embedder failures propagate unmodified, and any failure during the
    /// build leaves the prior snapshot untouched: nothing is written to the
    /// snapshot location until the new store is complete.
    #[inline]
    pub fn build_index(&self, text: &str, source_id: &str) -> Result<VectorStore> {
        let store = self.build_store(text, source_id)?;
        store.persist(&self.snapshot_dir)?;

        info!(
            "Index for '{}' built: {} nodes at dimension {:?}",
            source_id,
            store.len(),
            store.dimension()
        );
        Ok(store)
    }

    /// Run the chunk/embed/insert pipeline without persisting.
    ///
    /// Callers that bound the expensive embedding phase (e.g. with a
    /// timeout) use this and persist separately, so an abandoned build can
    /// never write a snapshot after the fact.
    #[inline]
    pub fn build_store(&self, text: &str, source_id: &str) -> Result<VectorStore> {
        info!(
            "Building index for '{}' ({} bytes)",
            source_id,
            text.len()
        );

        let nodes = chunk(text, source_id, &self.params)?;
        debug!("Chunked '{}' into {} nodes", source_id, nodes.len());

        let texts: Vec<String> = nodes.iter().map(|n| n.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;

        let mut store = VectorStore::new();
        store.insert(nodes, embeddings)?;
        Ok(store)
    }

    /// Load the persisted snapshot, if one exists.
    ///
    /// A missing snapshot is the normal first-run state and yields
    /// `Ok(None)`; a snapshot that exists but cannot be read is an error.
    #[inline]
    pub fn load_index(&self) -> Result<Option<VectorStore>> {
        match VectorStore::load(&self.snapshot_dir) {
            Ok(store) => Ok(Some(store)),
            Err(GraftError::NotFound(_)) => {
                debug!(
                    "No snapshot at {}; index is uninitialized",
                    self.snapshot_dir.display()
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
