
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capabilities::Embedding;
use crate::chunker::Node;
use crate::{GraftError, Result};

const SNAPSHOT_FORMAT_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const NODES_FILE: &str = "nodes.json";
const VECTORS_FILE: &str = "vectors.json";

/// Persistent collection of (node, embedding) pairs, searchable by cosine
/// similarity.
///
/// The store is insert-only; the dimensionality is established by the first
/// insertion and enforced afterwards. Search is a linear scan, which is the
/// right trade-off for the single-document workloads this serves.
#[derive(Debug, Default)]
pub struct VectorStore {
    nodes: Vec<Node>,
    vectors: Vec<Embedding>,
    dimension: Option<usize>,
}

/// A retrieved node with its similarity to the query vector
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub node: Node,
    /// Cosine similarity in [-1, 1], higher is more similar
    pub score: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    dimension: Option<usize>,
    node_count: usize,
    created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorFile {
    dimension: Option<usize>,
    /// Embeddings keyed by node id; must pair 1:1 with the node file
    vectors: BTreeMap<String, Embedding>,
}

impl VectorStore {
    /// Create an empty store with no established dimensionality
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dimensionality established by the first insertion, if any
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// The stored nodes, in insertion order
    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Append (node, embedding) pairs to the store.
    ///
    /// Every embedding is validated against the established dimensionality
    /// before anything is appended, so a rejected batch leaves the store
    /// unchanged. Does not persist; call [`VectorStore::persist`] separately.
    #[inline]
    pub fn insert(&mut self, nodes: Vec<Node>, embeddings: Vec<Embedding>) -> Result<()> {
        if nodes.len() != embeddings.len() {
            return Err(GraftError::InvalidInput(format!(
                "{} nodes paired with {} embeddings",
                nodes.len(),
                embeddings.len()
            )));
        }
        if nodes.is_empty() {
            debug!("No pairs to insert");
            return Ok(());
        }

        let expected = self.dimension.unwrap_or(embeddings[0].len());
        if expected == 0 {
            return Err(GraftError::InvalidInput(
                "embeddings must not be zero-length".to_string(),
            ));
        }
        for embedding in &embeddings {
            if embedding.len() != expected {
                return Err(GraftError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }

        self.dimension = Some(expected);
        self.nodes.extend(nodes);
        self.vectors.extend(embeddings);

        debug!(
            "Inserted batch; store now holds {} nodes at dimension {}",
            self.nodes.len(),
            expected
        );
        Ok(())
    }

    /// Return the `top_k` nodes most similar to `query`, ordered by
    /// descending cosine similarity. Ties keep insertion order. When `top_k`
    /// exceeds the store size, all nodes are returned.
    #[inline]
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if self.nodes.is_empty() {
            return Err(GraftError::EmptyIndex);
        }
        let dimension = self
            .dimension
            .unwrap_or_default();
        if query.len() != dimension {
            return Err(GraftError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut results: Vec<SearchResult> = self
            .nodes
            .iter()
            .zip(self.vectors.iter())
            .map(|(node, vector)| SearchResult {
                node: node.clone(),
                score: cosine_similarity(query, vector),
            })
            .collect();

        // Stable sort so equal scores resolve to the earlier-inserted node
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        debug!("Search returned {} of {} nodes", results.len(), self.len());
        Ok(results)
    }

    /// Write a complete snapshot of the store to `location`.
    ///
    /// The snapshot is staged in a sibling directory and swapped into place,
    /// so a failure partway through never leaves a snapshot that
    /// [`VectorStore::load`] would accept. Any prior snapshot at `location`
    /// is replaced.
    #[inline]
    pub fn persist(&self, location: &Path) -> Result<()> {
        let staging = sibling_dir(location, "staging")?;

        let write_result = self.write_snapshot(&staging);
        if let Err(e) = write_result {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!("Failed to remove staging directory {:?}: {}", staging, cleanup);
            }
            return Err(e);
        }

        if location.exists() {
            let old = sibling_path(location, "old")?;
            fs::rename(location, &old)?;
            fs::rename(&staging, location)?;
            if let Err(e) = fs::remove_dir_all(&old) {
                warn!("Failed to remove replaced snapshot {:?}: {}", old, e);
            }
        } else {
            fs::rename(&staging, location)?;
        }

        info!(
            "Persisted snapshot of {} nodes to {}",
            self.len(),
            location.display()
        );
        Ok(())
    }

    fn write_snapshot(&self, dir: &Path) -> Result<()> {
        let manifest = Manifest {
            format_version: SNAPSHOT_FORMAT_VERSION,
            dimension: self.dimension,
            node_count: self.nodes.len(),
            created_at: Utc::now().to_rfc3339(),
        };

        let mut vectors = BTreeMap::new();
        for (node, vector) in self.nodes.iter().zip(self.vectors.iter()) {
            vectors.insert(node.id.clone(), vector.clone());
        }
        let vector_file = VectorFile {
            dimension: self.dimension,
            vectors,
        };

        fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)
                .map_err(|e| GraftError::Other(e.into()))?,
        )?;
        fs::write(
            dir.join(NODES_FILE),
            serde_json::to_vec(&self.nodes).map_err(|e| GraftError::Other(e.into()))?,
        )?;
        fs::write(
            dir.join(VECTORS_FILE),
            serde_json::to_vec(&vector_file).map_err(|e| GraftError::Other(e.into()))?,
        )?;
        Ok(())
    }

    /// Load a snapshot previously written by [`VectorStore::persist`].
    ///
    /// Fails with [`GraftError::NotFound`] when no snapshot exists at
    /// `location` and with [`GraftError::CorruptIndex`] when one exists but
    /// is structurally invalid.
    #[inline]
    pub fn load(location: &Path) -> Result<Self> {
        if !location.is_dir() {
            return Err(GraftError::NotFound(location.display().to_string()));
        }

        let manifest: Manifest = read_snapshot_file(location, MANIFEST_FILE)?;
        if manifest.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(GraftError::CorruptIndex(format!(
                "unsupported snapshot format version {}",
                manifest.format_version
            )));
        }

        let nodes: Vec<Node> = read_snapshot_file(location, NODES_FILE)?;
        let mut vector_file: VectorFile = read_snapshot_file(location, VECTORS_FILE)?;

        if nodes.len() != manifest.node_count {
            return Err(GraftError::CorruptIndex(format!(
                "manifest records {} nodes but node store holds {}",
                manifest.node_count,
                nodes.len()
            )));
        }
        if manifest.dimension.is_none() && !nodes.is_empty() {
            return Err(GraftError::CorruptIndex(
                "snapshot holds nodes but records no dimensionality".to_string(),
            ));
        }
        if vector_file.dimension != manifest.dimension {
            return Err(GraftError::CorruptIndex(
                "vector store dimensionality disagrees with manifest".to_string(),
            ));
        }
        if vector_file.vectors.len() != nodes.len() {
            return Err(GraftError::CorruptIndex(format!(
                "{} nodes paired with {} vectors",
                nodes.len(),
                vector_file.vectors.len()
            )));
        }

        // Reassemble vectors in node (insertion) order; the pairing must be
        // total by node id.
        let mut vectors = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let vector = vector_file.vectors.remove(&node.id).ok_or_else(|| {
                GraftError::CorruptIndex(format!("node {} has no stored vector", node.id))
            })?;
            if let Some(dimension) = manifest.dimension {
                if vector.len() != dimension {
                    return Err(GraftError::CorruptIndex(format!(
                        "vector for node {} has length {}, expected {}",
                        node.id,
                        vector.len(),
                        dimension
                    )));
                }
            }
            vectors.push(vector);
        }

        info!(
            "Loaded snapshot of {} nodes from {}",
            nodes.len(),
            location.display()
        );

        Ok(Self {
            nodes,
            vectors,
            dimension: manifest.dimension,
        })
    }
}

fn read_snapshot_file<T: serde::de::DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let path = dir.join(name);
    let content = fs::read_to_string(&path)
        .map_err(|e| GraftError::CorruptIndex(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| GraftError::CorruptIndex(format!("cannot parse {}: {}", path.display(), e)))
}

/// Unique path next to `location`, used for staging and swap
fn sibling_path(location: &Path, tag: &str) -> Result<PathBuf> {
    let name = location
        .file_name()
        .ok_or_else(|| GraftError::InvalidInput("snapshot location has no name".to_string()))?
        .to_string_lossy();
    Ok(location.with_file_name(format!(".{}.{}-{}", name, tag, Uuid::new_v4())))
}

/// Fresh empty directory next to `location`
fn sibling_dir(location: &Path, tag: &str) -> Result<PathBuf> {
    let dir = sibling_path(location, tag)?;
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Cosine similarity between two equal-length vectors.
///
/// Zero-norm vectors compare as 0.0 rather than NaN.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
