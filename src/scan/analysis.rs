//! The classification service seam.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AnalysisError;
use crate::safety::Finding;
use crate::semantic::{ClassifierConfig, EmbeddingClassifier, EmbeddingProvider};

/// Semantic analysis of a flattened text. Returned span offsets index into
/// the text that was submitted.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, text: &str) -> Result<Vec<Finding>, AnalysisError>;
}

/// Runs an [`EmbeddingClassifier`] in process.
pub struct LocalAnalysis {
    classifier: EmbeddingClassifier,
}

impl LocalAnalysis {
    pub fn new(classifier: EmbeddingClassifier) -> Self {
        Self { classifier }
    }

    pub fn from_provider(provider: Arc<dyn EmbeddingProvider>, config: ClassifierConfig) -> Self {
        Self::new(EmbeddingClassifier::new(provider, config))
    }

    pub fn classifier(&self) -> &EmbeddingClassifier {
        &self.classifier
    }
}

#[async_trait]
impl AnalysisService for LocalAnalysis {
    fn name(&self) -> &str {
        "local-embeddings"
    }

    async fn analyze(&self, text: &str) -> Result<Vec<Finding>, AnalysisError> {
        Ok(self.classifier.analyze(text).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{EmbeddingError, KeywordEmbeddings};

    struct FailingEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbeddings {
        fn dimension(&self) -> usize {
            4
        }
        fn model_name(&self) -> &str {
            "failing"
        }
        fn max_input_length(&self) -> usize {
            100
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::AuthFailed)
        }
    }

    #[tokio::test]
    async fn test_embedding_errors_surface_as_analysis_errors() {
        let service = LocalAnalysis::from_provider(
            Arc::new(FailingEmbeddings),
            ClassifierConfig::default(),
        );
        let err = service
            .analyze("This paragraph has more than five words in it.")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Embedding(EmbeddingError::AuthFailed)));
    }

    #[tokio::test]
    async fn test_unrelated_text_is_clean_with_keyword_embeddings() {
        let service = LocalAnalysis::from_provider(
            Arc::new(KeywordEmbeddings::new()),
            ClassifierConfig::default(),
        );
        let findings = service
            .analyze("The quick brown fox jumps over the lazy dog today.")
            .await
            .unwrap();
        assert!(findings.is_empty());
        assert!(service.classifier().is_ready());
    }
}
