//! Embedding cache and vector math.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::semantic::{EmbeddingError, EmbeddingProvider};

/// Default number of cached embeddings.
pub const DEFAULT_CACHE_CAPACITY: usize = 500;

/// Cosine similarity of two unit vectors. Mismatched dimensions give 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Component-wise mean, re-normalized to unit length. `None` for an empty
/// set or mixed dimensions.
pub fn centroid(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let dim = vectors.first()?.len();
    if vectors.iter().any(|v| v.len() != dim) {
        return None;
    }
    let mut mean = vec![0.0f32; dim];
    for vector in vectors {
        for (m, x) in mean.iter_mut().zip(vector) {
            *m += x;
        }
    }
    let count = vectors.len() as f32;
    for m in &mut mean {
        *m /= count;
    }
    crate::semantic::normalize(&mut mean);
    Some(mean)
}

#[derive(Debug, Clone)]
struct Entry {
    vector: Arc<Vec<f32>>,
    stamp: u64,
}

/// Least-recently-used map from exact text to its embedding.
#[derive(Debug)]
pub struct VectorStore {
    capacity: usize,
    entries: HashMap<String, Entry>,
    /// Recency index: stamp -> key, oldest first.
    order: BTreeMap<u64, String>,
    clock: u64,
}

impl VectorStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: BTreeMap::new(),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Look up an embedding and mark it most recently used.
    pub fn get(&mut self, text: &str) -> Option<Arc<Vec<f32>>> {
        let stamp = self.tick();
        let entry = self.entries.get_mut(text)?;
        self.order.remove(&entry.stamp);
        entry.stamp = stamp;
        self.order.insert(stamp, text.to_string());
        Some(entry.vector.clone())
    }

    /// Insert or refresh an embedding. Evicts at most one entry.
    pub fn insert(&mut self, text: impl Into<String>, vector: Vec<f32>) -> Arc<Vec<f32>> {
        let text = text.into();
        let stamp = self.tick();
        let vector = Arc::new(vector);
        if let Some(old) = self.entries.insert(
            text.clone(),
            Entry {
                vector: vector.clone(),
                stamp,
            },
        ) {
            self.order.remove(&old.stamp);
        }
        self.order.insert(stamp, text);

        if self.entries.len() > self.capacity {
            if let Some((_, oldest)) = self.order.pop_first() {
                self.entries.remove(&oldest);
            }
        }
        vector
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.contains_key(text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for VectorStore {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// An embedding provider fronted by a [`VectorStore`].
pub struct CachedEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    store: Mutex<VectorStore>,
}

impl CachedEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        Self {
            provider,
            store: Mutex::new(VectorStore::new(capacity)),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    fn store(&self) -> std::sync::MutexGuard<'_, VectorStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of cached embeddings.
    pub fn cached(&self) -> usize {
        self.store().len()
    }

    /// Embed texts in order. Cache misses are sent to the provider in a
    /// single batch.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Arc<Vec<f32>>>, EmbeddingError> {
        let mut out: Vec<Option<Arc<Vec<f32>>>> = Vec::with_capacity(texts.len());
        let mut missing: Vec<String> = Vec::new();
        {
            let mut store = self.store();
            for text in texts {
                let hit = store.get(text);
                if hit.is_none() && !missing.contains(text) {
                    missing.push(text.clone());
                }
                out.push(hit);
            }
        }

        if !missing.is_empty() {
            tracing::debug!(
                "Embedding {} uncached texts with {}",
                missing.len(),
                self.provider.model_name()
            );
            let vectors = self.provider.embed_batch(&missing).await?;
            if vectors.len() != missing.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "Expected {} embeddings, got {}",
                    missing.len(),
                    vectors.len()
                )));
            }
            let fresh: HashMap<&str, Arc<Vec<f32>>> = {
                let mut store = self.store();
                missing
                    .iter()
                    .zip(vectors)
                    .map(|(text, vector)| (text.as_str(), store.insert(text.clone(), vector)))
                    .collect()
            };
            for (slot, text) in out.iter_mut().zip(texts) {
                if slot.is_none() {
                    *slot = fresh.get(text.as_str()).cloned();
                }
            }
        }

        out.into_iter()
            .map(|v| {
                v.ok_or_else(|| EmbeddingError::InvalidResponse("Missing embedding".to_string()))
            })
            .collect()
    }
}
