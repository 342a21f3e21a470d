use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};

use super::types::{DiagramArtifact, DiagramTicket};

pub(crate) type ConversionFuture = BoxFuture<'static, Option<Arc<DiagramArtifact>>>;
pub(crate) type SharedConversion = Shared<ConversionFuture>;

/// Conversions currently running, keyed by content hash.
///
/// Every caller asking for a hash that is already converting receives a clone
/// of the same shared future. The entry is dropped once the conversion settles.
#[derive(Default, Clone)]
pub struct InFlightConversions {
    conversions: Arc<DashMap<String, SharedConversion>>,
}

impl InFlightConversions {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn join_or_start(
        &self,
        content_hash: String,
        start: impl FnOnce() -> ConversionFuture,
    ) -> SharedConversion {
        match self.conversions.entry(content_hash) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                let guard = ConversionGuard {
                    content_hash: vacant.key().clone(),
                    conversions: Arc::clone(&self.conversions),
                };
                let work = start();
                let shared = async move {
                    let _guard = guard;
                    work.await
                }
                .boxed()
                .shared();
                vacant.insert(shared.clone());
                shared
            }
        }
    }

    pub fn len(&self) -> usize {
        self.conversions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }
}

struct ConversionGuard {
    content_hash: String,
    conversions: Arc<DashMap<String, SharedConversion>>,
}

impl Drop for ConversionGuard {
    fn drop(&mut self) {
        self.conversions.remove(&self.content_hash);
    }
}

#[derive(Debug, Clone)]
struct InstanceGeneration {
    generation: u64,
    content_hash: Option<String>,
}

/// Per-instance generation counters for diagram renders.
///
/// A new ticket is issued whenever an instance's source changes; only the
/// latest ticket may apply its result. Generations are drawn from one counter
/// shared by all instances, so a ticket is never reissued even after the
/// instance is forgotten.
#[derive(Default, Clone)]
pub struct DiagramGenerations {
    instances: Arc<DashMap<usize, InstanceGeneration>>,
    next: Arc<AtomicU64>,
}

impl DiagramGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, instance: usize, content_hash: Option<&str>) -> DiagramTicket {
        let generation = match self.instances.entry(instance) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                if current.content_hash.as_deref() != content_hash {
                    current.generation = self.bump();
                    current.content_hash = content_hash.map(str::to_string);
                }
                current.generation
            }
            Entry::Vacant(vacant) => {
                let generation = self.bump();
                vacant.insert(InstanceGeneration {
                    generation,
                    content_hash: content_hash.map(str::to_string),
                });
                generation
            }
        };

        DiagramTicket {
            instance,
            generation,
        }
    }

    pub fn is_current(&self, ticket: DiagramTicket) -> bool {
        self.instances
            .get(&ticket.instance)
            .is_some_and(|current| current.generation == ticket.generation)
    }

    /// Forget instances at or beyond `count`.
    pub fn truncate(&self, count: usize) {
        self.instances.retain(|instance, _| *instance < count);
    }

    fn bump(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }
}
