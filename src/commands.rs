use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::GraftError;
use crate::config::{Config, get_base_dir};
use crate::gemini::GeminiClient;
use crate::service::{IndexState, RagService};

fn build_service() -> Result<RagService> {
    let config = Config::load(get_base_dir()?)?;
    let client = Arc::new(GeminiClient::new(&config.gemini)?);
    let embedder = Arc::clone(&client) as Arc<dyn crate::capabilities::Embedder>;
    let synthesizer = client as Arc<dyn crate::capabilities::AnswerSynthesizer>;
    Ok(RagService::new(config, embedder, synthesizer))
}

/// Read a document as plain text, build the index, and persist it
#[inline]
pub async fn index_document(path: &Path) -> Result<()> {
    let source_id = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    info!("Indexing document: {}", path.display());

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;

    let service = build_service()?;
    let report = service.ingest(text, source_id).await?;

    println!("Indexed '{}':", report.source_id);
    println!("  Nodes: {}", report.nodes_indexed);
    println!("  Embedding dimension: {}", report.dimension);
    println!(
        "  Snapshot: {}",
        service.config().snapshot_dir().display()
    );

    Ok(())
}

/// Answer a query against the persisted index
#[inline]
pub async fn query(text: String, top_k: Option<usize>) -> Result<()> {
    let service = build_service()?;
    service.load_existing()?;

    let answered = match service.query(&text, top_k) {
        Ok(answered) => answered,
        Err(GraftError::EngineNotReady) => {
            println!("No index found. Run `graft index <file>` first.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", answered.answer);
    println!();
    println!("Sources:");
    for source in &answered.sources {
        let preview: String = source.text.chars().take(60).collect();
        println!(
            "  [{:.3}] {} ({}): {}",
            source.score, source.node_id, source.source_id, preview
        );
    }

    Ok(())
}

/// Show the state of the persisted index
#[inline]
pub async fn show_status() -> Result<()> {
    let service = build_service()?;
    service.load_existing()?;

    match service.state() {
        IndexState::Uninitialized => {
            println!("Index: uninitialized (no snapshot)");
            println!(
                "Expected snapshot location: {}",
                service.config().snapshot_dir().display()
            );
        }
        IndexState::Ready { nodes, dimension } => {
            println!("Index: ready");
            println!("  Nodes: {nodes}");
            println!("  Embedding dimension: {dimension}");
            println!(
                "  Snapshot: {}",
                service.config().snapshot_dir().display()
            );
        }
    }

    Ok(())
}

/// Print the active configuration as TOML
#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load(get_base_dir()?)?;
    let rendered =
        toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
    println!("# {}", config.config_file_path().display());
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{AnswerSynthesizer, Embedder};
    use crate::config::GeminiConfig;

    #[test]
    fn gemini_client_serves_both_capabilities() {
        let config = GeminiConfig {
            api_key: Some("test-key".to_string()),
            ..GeminiConfig::default()
        };
        let client = Arc::new(GeminiClient::new(&config).expect("client should build"));

        let embedder = Arc::clone(&client) as Arc<dyn Embedder>;
        let synthesizer = client as Arc<dyn AnswerSynthesizer>;

        assert_eq!(embedder.dimension(), 3072);
        drop(synthesizer);
    }
}
