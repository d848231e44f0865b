//! Configuration loaded from `PAGESHIELD_*` environment variables.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::safety::{DEFAULT_CONTEXT_AFTER, DEFAULT_CONTEXT_BEFORE, PatternDetector};
use crate::scan::{
    DEFAULT_ANALYSIS_TIMEOUT, DEFAULT_COOLDOWN, DEFAULT_DEBOUNCE, GuardSession, LocalAnalysis,
    ScanOptions, Scanner,
};
use crate::semantic::{ChunkConfig, ClassifierConfig, EmbeddingProvider, KeywordEmbeddings, OpenAiEmbeddings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Offline keyword vectors; coarse topic signal only.
    Keyword,
    OpenAi,
    /// In-process model, needs the `local-embeddings` feature.
    Local,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword" | "mock" => Ok(EmbeddingBackend::Keyword),
            "openai" => Ok(EmbeddingBackend::OpenAi),
            "local" | "fastembed" => Ok(EmbeddingBackend::Local),
            other => Err(format!("expected keyword, openai or local, got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingsConfig {
    pub backend: EmbeddingBackend,
    /// Model override for the OpenAI backend.
    pub model: Option<String>,
    pub api_key: Option<SecretString>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Keyword,
            model: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cooldown: Duration,
    pub debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Everything needed to assemble a [`GuardSession`].
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub scan: ScanOptions,
    /// Characters the directive window reaches before a hit.
    pub context_before: usize,
    /// Characters the directive window reaches after a hit.
    pub context_after: usize,
    pub semantic: ClassifierConfig,
    pub session: SessionConfig,
    pub embeddings: EmbeddingsConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            context_before: DEFAULT_CONTEXT_BEFORE,
            context_after: DEFAULT_CONTEXT_AFTER,
            semantic: ClassifierConfig::default(),
            session: SessionConfig::default(),
            embeddings: EmbeddingsConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup. Unset or empty keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = GuardConfig::default();

        let scan = ScanOptions {
            redact_entities: parse_bool(&get, "PAGESHIELD_REDACT_ENTITIES", defaults.scan.redact_entities)?,
            safe_senders: get("PAGESHIELD_SAFE_SENDERS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            semantic: parse_bool(&get, "PAGESHIELD_SEMANTIC_ENABLED", defaults.scan.semantic)?,
            analysis_timeout: Duration::from_millis(parse(
                &get,
                "PAGESHIELD_ANALYSIS_TIMEOUT_MS",
                DEFAULT_ANALYSIS_TIMEOUT.as_millis() as u64,
            )?),
        };

        let semantic = ClassifierConfig {
            anchor_threshold: parse_threshold(&get, "PAGESHIELD_ANCHOR_THRESHOLD", defaults.semantic.anchor_threshold)?,
            outlier_threshold: parse_threshold(&get, "PAGESHIELD_OUTLIER_THRESHOLD", defaults.semantic.outlier_threshold)?,
            chunking: ChunkConfig::default().with_min_words(parse(
                &get,
                "PAGESHIELD_MIN_CHUNK_WORDS",
                defaults.semantic.chunking.min_words,
            )?),
            cache_capacity: parse(&get, "PAGESHIELD_CACHE_CAPACITY", defaults.semantic.cache_capacity)?,
        };

        let session = SessionConfig {
            cooldown: Duration::from_millis(parse(
                &get,
                "PAGESHIELD_COOLDOWN_MS",
                DEFAULT_COOLDOWN.as_millis() as u64,
            )?),
            debounce: Duration::from_millis(parse(
                &get,
                "PAGESHIELD_DEBOUNCE_MS",
                DEFAULT_DEBOUNCE.as_millis() as u64,
            )?),
        };

        let embeddings = EmbeddingsConfig {
            backend: parse(&get, "PAGESHIELD_EMBEDDINGS", defaults.embeddings.backend)?,
            model: get("PAGESHIELD_EMBEDDING_MODEL"),
            api_key: get("OPENAI_API_KEY").map(SecretString::from),
        };

        Ok(Self {
            scan,
            context_before: parse(&get, "PAGESHIELD_CONTEXT_BEFORE", defaults.context_before)?,
            context_after: parse(&get, "PAGESHIELD_CONTEXT_AFTER", defaults.context_after)?,
            semantic,
            session,
            embeddings,
        })
    }

    pub fn pattern_detector(&self) -> PatternDetector {
        PatternDetector::new().with_context(self.context_before, self.context_after)
    }

    /// Instantiate the configured embedding backend.
    pub fn embedding_provider(&self) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
        match self.embeddings.backend {
            EmbeddingBackend::Keyword => Ok(Arc::new(KeywordEmbeddings::new())),
            EmbeddingBackend::OpenAi => {
                let key = self
                    .embeddings
                    .api_key
                    .clone()
                    .ok_or_else(|| ConfigError::MissingRequired {
                        key: "OPENAI_API_KEY".to_string(),
                    })?;
                let provider = match &self.embeddings.model {
                    Some(model) => {
                        let dimension = openai_dimension(model);
                        OpenAiEmbeddings::with_model(key, model.clone(), dimension)
                    }
                    None => OpenAiEmbeddings::new(key),
                };
                Ok(Arc::new(provider))
            }
            EmbeddingBackend::Local => local_provider(),
        }
    }

    /// Scanner with the configured detectors and, when semantic analysis is
    /// on, the configured embedding backend.
    pub fn build_scanner(&self) -> Result<Scanner, ConfigError> {
        let scanner = Scanner::new(self.scan.clone()).with_patterns(self.pattern_detector());
        if !self.scan.semantic {
            return Ok(scanner);
        }
        let analysis = LocalAnalysis::from_provider(self.embedding_provider()?, self.semantic.clone());
        Ok(scanner.with_analysis(Arc::new(analysis)))
    }

    pub fn build_session(&self) -> Result<GuardSession, ConfigError> {
        Ok(GuardSession::new(self.build_scanner()?).with_cooldown(self.session.cooldown))
    }
}

fn openai_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

#[cfg(feature = "local-embeddings")]
fn local_provider() -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
    crate::semantic::LocalEmbeddings::new()
        .map(|p| Arc::new(p) as Arc<dyn EmbeddingProvider>)
        .map_err(|e| ConfigError::InvalidValue {
            key: "PAGESHIELD_EMBEDDINGS".to_string(),
            message: e.to_string(),
        })
}

#[cfg(not(feature = "local-embeddings"))]
fn local_provider() -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
    Err(ConfigError::InvalidValue {
        key: "PAGESHIELD_EMBEDDINGS".to_string(),
        message: "built without the local-embeddings feature".to_string(),
    })
}

fn parse<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}

/// Similarities and distances live in `[0, 2]`.
fn parse_threshold<G>(get: &G, key: &str, default: f32) -> Result<f32, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value: f32 = parse(get, key, default)?;
    if !(0.0..=2.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{} is outside 0..=2", value),
        });
    }
    Ok(value)
}
