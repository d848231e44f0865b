//! Embedding providers for the semantic classifier.
//!
//! The classifier treats the model as an opaque `text -> unit vector`
//! function. Providers here wrap a hosted API, a local ONNX model, or a
//! keyword table for tests and offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::semantic::ContextLabel;

/// Error type for embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Option<std::time::Duration>,
    },

    #[error("Authentication failed")]
    AuthFailed,

    #[error("Initialization failed: {0}")]
    InitializationError(String),

    #[error("Execution failed: {0}")]
    ExecutionError(String),
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        EmbeddingError::HttpError(e.to_string())
    }
}

/// Trait for embedding providers. Returned vectors are L2-normalized.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Get the model name.
    fn model_name(&self) -> &str;

    /// Maximum input length in characters. Longer inputs are truncated.
    fn max_input_length(&self) -> usize;

    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts (batched).
    ///
    /// Default implementation calls embed() for each text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_input(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Scale a vector to unit length in place. Zero vectors are left alone.
pub fn normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// OpenAI embedding provider (text-embedding-3-small by default).
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    dimension: usize,
    url: String,
}

impl OpenAiEmbeddings {
    /// Create a provider for text-embedding-3-small (1536 dimensions).
    pub fn new(api_key: SecretString) -> Self {
        Self::with_model(api_key, "text-embedding-3-small", 1536)
    }

    /// Use a custom model with specified dimension.
    pub fn with_model(api_key: SecretString, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
            dimension,
            url: OPENAI_EMBEDDINGS_URL.to_string(),
        }
    }

    /// Point at an OpenAI-compatible endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_input_length(&self) -> usize {
        // 8191 tokens
        32_000
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let max = self.max_input_length();
        let request = OpenAiEmbeddingRequest {
            model: &self.model,
            input: texts.iter().map(|t| truncate_input(t, max)).collect(),
        };

        let response = self
            .client
            .post(&self.url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(EmbeddingError::AuthFailed);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(std::time::Duration::from_secs);
            return Err(EmbeddingError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::HttpError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        let result: OpenAiEmbeddingResponse = response.json().await.map_err(|e| {
            EmbeddingError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        if result.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Local embedding provider using fastembed-rs (all-MiniLM-L6-v2).
///
/// Downloads the model on first use. No API key required.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbeddings {
    model: std::sync::Arc<fastembed::TextEmbedding>,
    model_name: String,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbeddings {
    pub fn new() -> Result<Self, EmbeddingError> {
        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2);
        let model = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        tracing::info!("Loaded local embedding model all-MiniLM-L6-v2");
        Ok(Self {
            model: std::sync::Arc::new(model),
            model_name: "all-MiniLM-L6-v2".to_string(),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingProvider for LocalEmbeddings {
    fn dimension(&self) -> usize {
        384
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn max_input_length(&self) -> usize {
        512
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = self.model.clone();
        let texts_owned = texts.to_vec();

        tracing::debug!(
            "LocalEmbeddings: dispatching batch of {} texts to dedicated thread",
            texts_owned.len()
        );

        let (tx, rx) = tokio::sync::oneshot::channel();

        // ONNX Runtime needs a larger stack than tokio's blocking pool gives.
        std::thread::Builder::new()
            .name("fastembed-worker".to_string())
            .stack_size(8 * 1024 * 1024)
            .spawn(move || {
                let res = model.embed(texts_owned, None);
                let _ = tx.send(res);
            })
            .map_err(|e| EmbeddingError::ExecutionError(format!("Failed to spawn thread: {}", e)))?;

        let result = rx
            .await
            .map_err(|e| EmbeddingError::ExecutionError(format!("Thread join error: {}", e)))?
            .map_err(|e| EmbeddingError::ExecutionError(e.to_string()))?;

        Ok(result
            .into_iter()
            .map(|mut vec| {
                normalize(&mut vec);
                vec
            })
            .collect())
    }
}

/// Offline provider that needs no model.
///
/// Each anchor sentence gets its own axis. Any other text is the normalized
/// sum of the axes whose keywords it contains, and text with no keyword lands
/// on an extra neutral axis. The result is deterministic and carries just
/// enough topic signal to exercise the classifier end to end.
#[derive(Debug, Default)]
pub struct KeywordEmbeddings {
    batch_calls: AtomicUsize,
}

impl KeywordEmbeddings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `embed_batch` calls served so far.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn keywords(label: ContextLabel) -> &'static [&'static str] {
        match label {
            ContextLabel::Medical => &["patient", "symptom", "clinic", "medication"],
            ContextLabel::WorkProfessional => &["meeting", "deadline", "quarterly"],
            ContextLabel::Personal => &["birthday", "vacation", "family"],
            ContextLabel::Ecommerce => &["shipping", "order", "delivery"],
            ContextLabel::Technical => &["endpoint", "server config", "compile"],
            ContextLabel::FinancialAction => &["wire", "bank account", "invoice"],
            ContextLabel::ItAdminCommands => &["sudo", "root access", "firmware"],
            ContextLabel::UrgentDirective => &["immediately", "suspended"],
            ContextLabel::InstructionOverride => &["ignore all previous", "disregard prior"],
            ContextLabel::DataExfiltration => &["upload the file", "send the above"],
        }
    }

    fn vector(text: &str) -> Vec<f32> {
        let neutral = ContextLabel::ALL.len();
        let mut v = vec![0.0; neutral + 1];
        if let Some(i) = ContextLabel::ALL.iter().position(|l| l.anchor() == text) {
            v[i] = 1.0;
            return v;
        }
        let lower = text.to_lowercase();
        for (i, label) in ContextLabel::ALL.into_iter().enumerate() {
            if Self::keywords(label).iter().any(|w| lower.contains(w)) {
                v[i] = 1.0;
            }
        }
        if v.iter().all(|x| *x == 0.0) {
            v[neutral] = 1.0;
        }
        normalize(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbeddings {
    fn dimension(&self) -> usize {
        ContextLabel::ALL.len() + 1
    }

    fn model_name(&self) -> &str {
        "keyword-basis"
    }

    fn max_input_length(&self) -> usize {
        100_000
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(Self::vector(truncate_input(text, self.max_input_length())))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let max = self.max_input_length();
        Ok(texts
            .iter()
            .map(|t| Self::vector(truncate_input(t, max)))
            .collect())
    }
}
