
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use url::Url;

use crate::capabilities::{AnswerSynthesizer, Embedder, Embedding};
use crate::config::GeminiConfig;
use crate::{GraftError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for the Google Generative Language API, providing both the
/// embedding and the answer-synthesis capabilities.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    api_key: String,
    embedding_model: String,
    generation_model: String,
    embedding_dimension: usize,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    content: Content,
}

#[derive(Debug, Serialize)]
struct BatchEmbedContentsRequest {
    requests: Vec<BatchEmbedItem>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedItem {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedContentsResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: String,
}

impl GeminiClient {
    /// Build a client from configuration. The API key comes from the config
    /// or, failing that, the `GOOGLE_API_KEY` environment variable; a missing
    /// key is rejected here rather than on the first call.
    #[inline]
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                GraftError::Config(
                    "no Gemini API key configured; set GOOGLE_API_KEY or gemini.api_key"
                        .to_string(),
                )
            })?;

        let base_url = config
            .endpoint()
            .map_err(|e| GraftError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            embedding_dimension: config.embedding_dimension as usize,
            batch_size: config.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Check that the API is reachable with the configured key
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let url = self
            .models_url()
            .map_err(|e| GraftError::Config(e.to_string()))?;

        debug!("Pinging Generative Language API at {}", self.base_url);

        self.request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .map_err(GraftError::Embedding)?;

        debug!("Health check passed");
        Ok(())
    }

    fn models_url(&self) -> std::result::Result<Url, url::ParseError> {
        let mut url = self.base_url.join("/v1beta/models")?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn model_url(&self, model: &str, action: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("/v1beta/models/{}:{}", model, action))
            .map_err(|e| GraftError::Config(format!("invalid API URL: {}", e)))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn post_json<Req: Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        url: &Url,
        request: &Req,
    ) -> std::result::Result<Resp, String> {
        let body = serde_json::to_string(request)
            .map_err(|e| format!("failed to serialize request: {}", e))?;

        let response_text = self.request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        serde_json::from_str(&response_text)
            .map_err(|e| format!("failed to parse response: {}", e))
    }

    fn request_with_retry<F>(&self, mut request_fn: F) -> std::result::Result<String, String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(format!("HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(format!("request failed: {}", error));
                    }

                    last_error = Some(format!("request failed: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        debug!("Waiting {}ms before retry", delay_ms);
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);
        Err(last_error.unwrap_or_else(|| "request failed after retries".to_string()))
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let url = self.model_url(&self.embedding_model, "batchEmbedContents")?;
        let request = BatchEmbedContentsRequest {
            requests: texts
                .iter()
                .map(|text| BatchEmbedItem {
                    model: format!("models/{}", self.embedding_model),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                })
                .collect(),
        };

        let response: BatchEmbedContentsResponse = self
            .post_json(&url, &request)
            .map_err(GraftError::Embedding)?;

        if response.embeddings.len() != texts.len() {
            return Err(GraftError::Embedding(format!(
                "requested {} embeddings but received {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }
}

impl Embedder for GeminiClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Embedding> {
        debug!("Embedding text of {} bytes", text.len());

        let url = self.model_url(&self.embedding_model, "embedContent")?;
        let request = EmbedContentRequest {
            content: Content {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
        };

        let response: EmbedContentResponse = self
            .post_json(&url, &request)
            .map_err(GraftError::Embedding)?;

        debug!(
            "Received embedding with {} dimensions",
            response.embedding.values.len()
        );
        Ok(response.embedding.values)
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            results.extend(self.embed_single_batch(batch)?);
        }

        debug!("Embedded {} texts total", results.len());
        Ok(results)
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.embedding_dimension
    }
}

impl AnswerSynthesizer for GeminiClient {
    #[inline]
    fn synthesize(&self, query: &str, context: &[&str]) -> Result<String> {
        debug!(
            "Synthesizing answer from {} context passages",
            context.len()
        );

        let url = self.model_url(&self.generation_model, "generateContent")?;
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(query, context),
                }],
            }],
        };

        let response: GenerateContentResponse = self
            .post_json(&url, &request)
            .map_err(GraftError::Synthesis)?;

        let answer = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| {
                GraftError::Synthesis("response contained no candidates".to_string())
            })?;

        Ok(answer)
    }
}

/// Assemble the grounded prompt from retrieved passages and the user query
fn build_prompt(query: &str, context: &[&str]) -> String {
    let mut prompt = String::from(
        "Answer the question using only the context passages below. \
         If the context does not contain the answer, say so.\n\n",
    );
    for (i, passage) in context.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n\n", i + 1, passage));
    }
    prompt.push_str(&format!("Question: {}", query));
    prompt
}
