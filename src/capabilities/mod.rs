// Capability interfaces consumed by the indexing and query core.
// Implemented elsewhere (Gemini in production, deterministic fakes in tests)
// and injected, so the core never touches the network directly.

use crate::Result;

/// A fixed-dimension vector representation of a piece of text
pub type Embedding = Vec<f32>;

/// Converts text into fixed-dimension vectors.
///
/// All embeddings produced by one implementation must have the same length;
/// the store treats a change in length as an error, not a migration.
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed multiple texts. Implementations may batch for efficiency.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// The dimensionality of every embedding this implementation produces
    fn dimension(&self) -> usize;
}

/// Composes a grounded answer from a query and retrieved context texts.
pub trait AnswerSynthesizer: Send + Sync {
    /// Generate an answer to `query` using only the given context texts
    fn synthesize(&self, query: &str, context: &[&str]) -> Result<String>;
}
