//! Per-identifier OU cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

/// Result of one lookup: the OU, or `None` when the DN could not be found.
pub type Lookup = Option<String>;

/// Read-through cache of OU lookups.
///
/// Concurrent misses on the same identifier share one lookup: the first
/// caller runs it, the others wait for its result.
#[derive(Debug, Default)]
pub struct OuCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Lookup>>>>,
}

impl OuCache {
    /// Create an empty [`OuCache`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `identifier`, if a lookup already completed.
    #[cfg(test)]
    fn get(&self, identifier: &str) -> Option<Lookup> {
        self.lock()
            .get(identifier)
            .and_then(|cell| cell.get().cloned())
    }

    /// Return the cached value for `identifier`, running `lookup` on a miss.
    ///
    /// The boolean is `true` when the value came from the cache.
    pub async fn get_or_lookup<F, Fut>(&self, identifier: &str, lookup: F) -> (Lookup, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Lookup>,
    {
        let cell = Arc::clone(
            self.lock()
                .entry(identifier.to_owned())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        );

        if let Some(value) = cell.get() {
            return (value.clone(), true);
        }

        let mut ran = false;
        let value = cell
            .get_or_init(|| {
                ran = true;
                lookup()
            })
            .await
            .clone();

        (value, !ran)
    }

    /// Evict `identifier`, or everything when `None`.
    pub fn clear(&self, identifier: Option<&str>) {
        let mut entries = self.lock();
        match identifier {
            Some(identifier) => {
                entries.remove(identifier);
            },
            None => entries.clear(),
        }
    }

    /// Number of identifiers with a cache slot.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<OnceCell<Lookup>>>> {
        // Entries stay consistent even if a holder panicked.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_read_through() {
        let cache = OuCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let lookup = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Some("OU=first".to_owned())
        };

        assert_eq!(cache.get("alice"), None);
        assert_eq!(
            cache.get_or_lookup("alice", lookup).await,
            (Some("OU=first".to_owned()), false)
        );
        assert_eq!(
            cache.get_or_lookup("alice", lookup).await,
            (Some("OU=first".to_owned()), true)
        );
        assert_eq!(cache.get("alice"), Some(Some("OU=first".to_owned())));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_cached() {
        let cache = OuCache::new();

        let (value, hit) = cache.get_or_lookup("ghost", || async { None }).await;
        assert_eq!(value, None);
        assert!(!hit);
        assert_eq!(cache.get("ghost"), Some(None));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = OuCache::new();
        cache.get_or_lookup("a", || async { Some(String::new()) }).await;
        cache.get_or_lookup("b", || async { None }).await;
        assert_eq!(cache.len(), 2);

        cache.clear(Some("a"));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(None));

        cache.clear(None);
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_miss_single_lookup() {
        let cache = Arc::new(OuCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_lookup("alice", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Some("OU=first".to_owned())
                        })
                        .await
                        .0
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            assert_eq!(task.await.unwrap().as_deref(), Some("OU=first"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
