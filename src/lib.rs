use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraftError>;

#[derive(Error, Debug)]
pub enum GraftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding dimension mismatch: store expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Search against an empty index")]
    EmptyIndex,

    #[error("Corrupt index snapshot: {0}")]
    CorruptIndex(String),

    #[error("No index snapshot at {0}")]
    NotFound(String),

    #[error("Query engine is not ready; build or load an index first")]
    EngineNotReady,

    #[error("Query text is empty")]
    EmptyQuery,

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Answer synthesis error: {0}")]
    Synthesis(String),

    #[error("Index build timed out after {0} seconds")]
    BuildTimeout(u64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod capabilities;
pub mod chunker;
pub mod commands;
pub mod config;
pub mod engine;
pub mod gemini;
pub mod index;
pub mod service;
pub mod store;
