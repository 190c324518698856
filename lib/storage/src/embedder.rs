// Local embedders
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tokio::sync::Mutex;

use panelx_core::{Embedder, Error, Result};

/// Deterministic feature-hashing embedder.
///
/// Character trigrams and whole words are hashed into a fixed number of
/// buckets and the result is unit-normalized. Texts sharing words or
/// sub-words land close together, which is enough for offline runs and
/// tests; production deployments inject a real model instead.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig("embedding dimension must be positive".into()));
        }
        Ok(Self { dimension })
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let normalized = text.trim().to_lowercase();

        for trigram in trigrams(&normalized) {
            vector[self.bucket(&trigram)] += 1.0;
        }
        // words weigh more than sub-word fragments
        for word in normalized.split_whitespace() {
            vector[self.bucket(word)] += 2.0;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in &mut vector {
                *v /= magnitude;
            }
        }
        vector
    }

    /// Buckets must not move between builds: stored vectors are compared
    /// with freshly embedded queries.
    fn bucket(&self, item: &str) -> usize {
        let digest = Sha256::digest(item.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(prefix) % self.dimension as u64) as usize
    }
}

fn trigrams(s: &str) -> HashSet<String> {
    let padded = format!("  {}  ", s);
    let chars: Vec<char> = padded.chars().collect();
    if chars.len() < 3 {
        return HashSet::new();
    }
    chars.windows(3).map(|w| w.iter().collect::<String>()).collect()
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::EmbeddingFailure("cannot embed blank text".into()));
        }
        Ok(self.embed_sync(text))
    }
}

/// Serializes access to a model that tolerates only one caller at a time
pub struct SerializedEmbedder<E> {
    inner: Mutex<E>,
    dimension: usize,
}

impl<E: Embedder> SerializedEmbedder<E> {
    pub fn new(inner: E) -> Self {
        let dimension = inner.dimension();
        Self {
            inner: Mutex::new(inner),
            dimension,
        }
    }
}

#[async_trait]
impl<E: Embedder> Embedder for SerializedEmbedder<E> {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.inner.lock().await;
        model.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.inner.lock().await;
        model.embed_batch(texts).await
    }
}
