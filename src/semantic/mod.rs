//! Semantic layer: embeddings, the anchor taxonomy and the context classifier.
//!
//! Text is split into line-run chunks, embedded, and compared against a fixed
//! set of anchor sentences. Chunks that resemble a zero-tolerance category are
//! always flagged; other risky chunks are flagged only when they stray from
//! the document's own topic.

mod anchors;
mod chunker;
mod classifier;
mod embeddings;
mod vector_store;

pub use anchors::{ContextLabel, RiskTier};
pub use chunker::{Chunk, ChunkConfig, DEFAULT_MIN_CHUNK_WORDS, chunk_lines};
pub use classifier::{
    Classification, ClassifierConfig, DEFAULT_ANCHOR_THRESHOLD, DEFAULT_OUTLIER_THRESHOLD,
    EmbeddingClassifier, classify_against, judge,
};
#[cfg(feature = "local-embeddings")]
pub use embeddings::LocalEmbeddings;
pub use embeddings::{
    EmbeddingError, EmbeddingProvider, KeywordEmbeddings, OpenAiEmbeddings, normalize,
    truncate_input,
};
pub use vector_store::{
    CachedEmbedder, DEFAULT_CACHE_CAPACITY, VectorStore, centroid, cosine_distance,
    cosine_similarity,
};
