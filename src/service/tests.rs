use super::*;
use crate::capabilities::Embedding;
use crate::chunker::ChunkParams;
use crate::config::{GeminiConfig, RetrievalConfig};
use std::time::Duration;
use tempfile::TempDir;

const KEYWORDS: [&str; 4] = ["cat", "dog", "bird", "fish"];

struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> crate::Result<Embedding> {
        let lowered = text.to_lowercase();
        Ok(KEYWORDS
            .iter()
            .map(|kw| if lowered.contains(kw) { 1.0 } else { 0.0 })
            .collect())
    }

    fn dimension(&self) -> usize {
        KEYWORDS.len()
    }
}

/// Embedder slow enough to trip a one-second build budget
struct SlowEmbedder;

impl Embedder for SlowEmbedder {
    fn embed(&self, _text: &str) -> crate::Result<Embedding> {
        std::thread::sleep(Duration::from_secs(3));
        Ok(vec![1.0; KEYWORDS.len()])
    }

    fn dimension(&self) -> usize {
        KEYWORDS.len()
    }
}

struct EchoSynthesizer;

impl AnswerSynthesizer for EchoSynthesizer {
    fn synthesize(&self, _query: &str, context: &[&str]) -> crate::Result<String> {
        Ok(context.join(" | "))
    }
}

fn test_config(temp: &TempDir, build_timeout_secs: u64) -> Config {
    Config {
        gemini: GeminiConfig::default(),
        chunking: ChunkParams {
            chunk_size: 20,
            overlap: 5,
        },
        retrieval: RetrievalConfig {
            top_k: 3,
            build_timeout_secs,
        },
        base_dir: temp.path().to_path_buf(),
    }
}

fn service(temp: &TempDir) -> RagService {
    RagService::new(
        test_config(temp, 300),
        Arc::new(KeywordEmbedder),
        Arc::new(EchoSynthesizer),
    )
}

#[tokio::test]
async fn query_before_any_build_fails_not_ready() {
    let temp = TempDir::new().expect("should create temp dir");
    let service = service(&temp);

    assert_eq!(service.state(), IndexState::Uninitialized);
    let result = service.query("What did the cat do?", None);
    assert!(matches!(result, Err(GraftError::EngineNotReady)));
}

#[tokio::test]
async fn ingest_transitions_to_ready() {
    let temp = TempDir::new().expect("should create temp dir");
    let service = service(&temp);

    let report = service
        .ingest(
            "The cat sat. The dog ran. The bird flew.".to_string(),
            "animals.txt".to_string(),
        )
        .await
        .expect("ingest should succeed");

    assert!(report.nodes_indexed >= 2);
    assert_eq!(report.dimension, KEYWORDS.len());
    assert!(matches!(service.state(), IndexState::Ready { .. }));
}

#[tokio::test]
async fn query_retrieves_the_relevant_node() {
    let temp = TempDir::new().expect("should create temp dir");
    let service = service(&temp);

    service
        .ingest(
            "The cat sat. The dog ran. The bird flew.".to_string(),
            "animals.txt".to_string(),
        )
        .await
        .expect("ingest should succeed");

    let answered = service
        .query("What did the cat do?", None)
        .expect("query should succeed");
    assert!(answered.sources[0].text.contains("The cat sat."));
}

#[tokio::test]
async fn load_existing_binds_persisted_snapshot() {
    let temp = TempDir::new().expect("should create temp dir");

    service(&temp)
        .ingest(
            "The fish swam in the bowl.".to_string(),
            "fish.txt".to_string(),
        )
        .await
        .expect("ingest should succeed");

    // A fresh service over the same base dir picks up the snapshot
    let restarted = service(&temp);
    assert_eq!(restarted.state(), IndexState::Uninitialized);
    assert!(restarted.load_existing().expect("load should succeed"));
    assert!(matches!(restarted.state(), IndexState::Ready { .. }));

    let answered = restarted
        .query("Where is the fish?", None)
        .expect("query should succeed");
    assert!(answered.sources[0].text.contains("fish"));
}

#[tokio::test]
async fn load_existing_without_snapshot_stays_uninitialized() {
    let temp = TempDir::new().expect("should create temp dir");
    let service = service(&temp);

    assert!(!service.load_existing().expect("load should succeed"));
    assert_eq!(service.state(), IndexState::Uninitialized);
}

#[tokio::test]
async fn rebuild_fully_replaces_the_first_index() {
    let temp = TempDir::new().expect("should create temp dir");
    let service = service(&temp);

    service
        .ingest("The cat sat on the mat.".to_string(), "first.txt".to_string())
        .await
        .expect("ingest should succeed");
    service
        .ingest("The fish swam away.".to_string(), "second.txt".to_string())
        .await
        .expect("ingest should succeed");

    // Even a query about the first document only ever sees the second
    let answered = service
        .query("What did the cat do?", Some(10))
        .expect("query should succeed");
    assert!(
        answered
            .sources
            .iter()
            .all(|s| s.source_id == "second.txt")
    );
}

#[tokio::test]
async fn timed_out_build_leaves_prior_engine_bound() {
    let temp = TempDir::new().expect("should create temp dir");

    let quick = RagService::new(
        test_config(&temp, 1),
        Arc::new(KeywordEmbedder),
        Arc::new(EchoSynthesizer),
    );
    quick
        .ingest("The cat sat.".to_string(), "first.txt".to_string())
        .await
        .expect("ingest should succeed");

    let slow = RagService::new(
        test_config(&temp, 1),
        Arc::new(SlowEmbedder),
        Arc::new(EchoSynthesizer),
    );
    slow.load_existing().expect("load should succeed");

    let result = slow
        .ingest("The dog ran.".to_string(), "second.txt".to_string())
        .await;
    assert!(matches!(result, Err(GraftError::BuildTimeout(1))));

    // The previously bound engine still answers
    let answered = slow
        .query("What did the cat do?", None)
        .expect("query should succeed");
    assert!(answered.sources[0].text.contains("cat"));
}

#[tokio::test]
async fn empty_document_yields_an_empty_but_ready_index() {
    let temp = TempDir::new().expect("should create temp dir");
    let service = service(&temp);

    let report = service
        .ingest(String::new(), "empty.txt".to_string())
        .await
        .expect("ingest should succeed");
    assert_eq!(report.nodes_indexed, 0);

    let result = service.query("anything", None);
    assert!(matches!(result, Err(GraftError::EmptyIndex)));
}
