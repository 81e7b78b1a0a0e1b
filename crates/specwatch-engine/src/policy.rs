//! Per-type exception policy and its process-lifetime cache
//!
//! Whether a specification type handles exceptions (the observed action's
//! failure is captured for inspection instead of failing the whole class run)
//! is declared through the host's metadata facility. The engine never reads
//! attributes or annotations itself; it asks an opaque [`CapabilityProbe`]
//! once per type and memoizes the answer for the lifetime of the process.
//!
//! The cache is the only state shared across class runs, so it is the only
//! structure in the engine that needs explicit mutual exclusion: a
//! reader/writer lock keeps cache hits concurrent while serializing the rare
//! first-computation path per type.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

/// Capability markers the engine can query on a specification type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Failures of the observed action are captured rather than propagated
    HandleExceptions,
}

/// Opaque capability query answered by the host's metadata facility
///
/// Implementations must be thread-safe (`Send + Sync`); the engine shares one
/// probe across all concurrent class runs. The probe may be arbitrarily
/// expensive — the engine calls it at most once per (type, capability) and
/// caches the boolean.
pub trait CapabilityProbe: Send + Sync {
    /// Whether the given type declares the given capability
    fn has_capability(&self, ty: TypeId, capability: Capability) -> bool;
}

/// Registration-based capability probe
///
/// For hosts without a richer metadata facility: types opt into capabilities
/// explicitly at construction time.
///
/// # Examples
///
/// ```ignore
/// let probe = StaticCapabilities::new().handle_exceptions::<ThrowingSpec>();
/// assert!(probe.has_capability(TypeId::of::<ThrowingSpec>(), Capability::HandleExceptions));
/// ```
#[derive(Debug, Default)]
pub struct StaticCapabilities {
    handle_exceptions: HashSet<TypeId>,
}

impl StaticCapabilities {
    /// Create an empty probe: no type declares any capability
    pub fn new() -> Self {
        Self::default()
    }

    /// Opt a type into the handle-exceptions capability
    pub fn handle_exceptions<S: 'static>(mut self) -> Self {
        self.handle_exceptions.insert(TypeId::of::<S>());
        self
    }
}

impl CapabilityProbe for StaticCapabilities {
    fn has_capability(&self, ty: TypeId, capability: Capability) -> bool {
        match capability {
            Capability::HandleExceptions => self.handle_exceptions.contains(&ty),
        }
    }
}

/// Process-lifetime cache of the handle-exceptions policy, keyed by type
///
/// The resolved boolean is stable for the lifetime of the process. Concurrent
/// first-time lookups for the same type are serialized by the write lock's
/// double-checked re-read, so the probe runs at most once per type.
pub struct ExceptionPolicyCache {
    probe: Arc<dyn CapabilityProbe>,
    cache: RwLock<HashMap<TypeId, bool>>,
}

impl ExceptionPolicyCache {
    /// Create an empty cache backed by the given probe
    pub fn new(probe: Arc<dyn CapabilityProbe>) -> Self {
        Self {
            probe,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the type opts into absorbing observed-action failures
    pub async fn should_handle_exceptions(&self, ty: TypeId) -> bool {
        {
            let cache = self.cache.read().await;
            if let Some(&handles) = cache.get(&ty) {
                return handles;
            }
        }

        let mut cache = self.cache.write().await;
        // Re-check under the write lock: a racing lookup may have resolved
        // the same type between our read and write acquisitions.
        if let Some(&handles) = cache.get(&ty) {
            return handles;
        }

        let handles = self.probe.has_capability(ty, Capability::HandleExceptions);
        debug!(?ty, handles, "resolved handle-exceptions policy");
        cache.insert(ty, handles);
        handles
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Throwing;
    struct Plain;

    /// Probe that counts how many times it is consulted
    struct CountingProbe {
        calls: AtomicUsize,
        handled: TypeId,
    }

    impl CapabilityProbe for CountingProbe {
        fn has_capability(&self, ty: TypeId, capability: Capability) -> bool {
            assert_eq!(capability, Capability::HandleExceptions);
            self.calls.fetch_add(1, Ordering::SeqCst);
            ty == self.handled
        }
    }

    #[tokio::test]
    async fn resolves_and_memoizes_per_type() {
        let probe = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
            handled: TypeId::of::<Throwing>(),
        });
        let cache = ExceptionPolicyCache::new(probe.clone());

        assert!(cache.should_handle_exceptions(TypeId::of::<Throwing>()).await);
        assert!(!cache.should_handle_exceptions(TypeId::of::<Plain>()).await);

        // Repeated queries hit the cache, not the probe.
        for _ in 0..10 {
            assert!(cache.should_handle_exceptions(TypeId::of::<Throwing>()).await);
            assert!(!cache.should_handle_exceptions(TypeId::of::<Plain>()).await);
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_lookups_resolve_once_and_agree() {
        let probe = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
            handled: TypeId::of::<Throwing>(),
        });
        let cache = Arc::new(ExceptionPolicyCache::new(probe.clone()));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                cache.should_handle_exceptions(TypeId::of::<Throwing>()).await
            }));
        }

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn static_probe_answers_registrations() {
        let probe = StaticCapabilities::new().handle_exceptions::<Throwing>();
        assert!(probe.has_capability(TypeId::of::<Throwing>(), Capability::HandleExceptions));
        assert!(!probe.has_capability(TypeId::of::<Plain>(), Capability::HandleExceptions));
    }
}
