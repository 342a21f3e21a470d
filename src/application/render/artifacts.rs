//! Diagram artifact storage keyed by content hash.
//!
//! A cache lives for the lifetime of one mounted document. The default store is
//! append-only; an LRU-bounded store is available when memory must be capped.

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::{Arc, RwLock},
};

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::{
    application::render::types::DiagramArtifact,
    util::lock::{rw_read, rw_write},
};

const SOURCE: &str = "application::render::artifacts";

/// Lowercase hex SHA-256 of `source`.
pub fn content_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

/// Injectable store of converted diagrams.
pub trait ArtifactCache: Send + Sync {
    fn get(&self, content_hash: &str) -> Option<Arc<DiagramArtifact>>;
    fn insert(&self, artifact: Arc<DiagramArtifact>);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Select the store for a configured capacity; `0` means unbounded.
pub fn artifact_cache(capacity: usize) -> Arc<dyn ArtifactCache> {
    match NonZeroUsize::new(capacity) {
        Some(capacity) => Arc::new(LruArtifactCache::new(capacity)),
        None => Arc::new(MemoryArtifactCache::default()),
    }
}

/// Unbounded, append-only cache. An entry is never replaced once stored.
#[derive(Default)]
pub struct MemoryArtifactCache {
    entries: RwLock<HashMap<String, Arc<DiagramArtifact>>>,
}

impl ArtifactCache for MemoryArtifactCache {
    fn get(&self, content_hash: &str) -> Option<Arc<DiagramArtifact>> {
        rw_read(&self.entries, SOURCE, "memory.get")
            .get(content_hash)
            .cloned()
    }

    fn insert(&self, artifact: Arc<DiagramArtifact>) {
        rw_write(&self.entries, SOURCE, "memory.insert")
            .entry(artifact.content_hash.clone())
            .or_insert(artifact);
    }

    fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "memory.len").len()
    }
}

/// Capacity-bounded cache evicting the least recently used artifact.
pub struct LruArtifactCache {
    entries: RwLock<LruCache<String, Arc<DiagramArtifact>>>,
}

impl LruArtifactCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }
}

impl ArtifactCache for LruArtifactCache {
    fn get(&self, content_hash: &str) -> Option<Arc<DiagramArtifact>> {
        // Lookups promote the entry, so they need the write half.
        rw_write(&self.entries, SOURCE, "lru.get")
            .get(content_hash)
            .cloned()
    }

    fn insert(&self, artifact: Arc<DiagramArtifact>) {
        rw_write(&self.entries, SOURCE, "lru.insert").put(artifact.content_hash.clone(), artifact);
    }

    fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "lru.len").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(source: &str) -> Arc<DiagramArtifact> {
        Arc::new(DiagramArtifact {
            content_hash: content_hash(source),
            rendered_image: format!("data:image/svg+xml;base64,{source}"),
            source_text: source.to_string(),
        })
    }

    #[test]
    fn hash_is_lowercase_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(content_hash("graph TD;A-->B"), content_hash("graph TD;A-->B"));
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn memory_cache_is_append_only() {
        let cache = MemoryArtifactCache::default();
        let first = artifact("graph TD;A-->B");
        cache.insert(Arc::clone(&first));

        let replacement = Arc::new(DiagramArtifact {
            rendered_image: "data:image/svg+xml;base64,other".into(),
            ..(*first).clone()
        });
        cache.insert(replacement);

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(&first.content_hash).map(|a| a.rendered_image.clone()),
            Some(first.rendered_image.clone())
        );
    }

    #[test]
    fn lru_cache_evicts_least_recent() {
        let cache = LruArtifactCache::new(NonZeroUsize::new(2).expect("non-zero"));
        let a = artifact("a");
        let b = artifact("b");
        let c = artifact("c");
        cache.insert(Arc::clone(&a));
        cache.insert(Arc::clone(&b));
        assert!(cache.get(&a.content_hash).is_some());
        cache.insert(Arc::clone(&c));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a.content_hash).is_some());
        assert!(cache.get(&b.content_hash).is_none());
        assert!(cache.get(&c.content_hash).is_some());
    }

    #[test]
    fn zero_capacity_selects_unbounded_store() {
        let cache = artifact_cache(0);
        for index in 0..64 {
            cache.insert(artifact(&index.to_string()));
        }
        assert_eq!(cache.len(), 64);
        assert!(artifact_cache(1).is_empty());
    }
}
