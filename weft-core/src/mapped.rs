//! Keyed collection projection.
//!
//! `mapped` maintains a derived sequence obtained by running every source
//! item through a factory, memoized by item key across runs:
//!
//! - an item present before and after a source change reuses its cached
//!   result without re-invoking the factory;
//! - an item that left the source has its cleanup (if any) invoked exactly
//!   once;
//! - a new item gets a fresh factory call.
//!
//! The output preserves the source's order. Keys are compared with
//! `Eq + Hash`; hosts that want identity semantics key their items by a
//! handle or id type. Duplicate occurrences of one key share a single
//! cached entry and a single cleanup.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cell::Cell;
use crate::effect::{Cleanup, Effect};

struct CacheEntry<R> {
    result: R,
    cleanup: Option<Cleanup>,
}

/// Read-only view over the projected sequence.
pub struct Mapped<K, R>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    cell: Cell<Vec<R>>,
    effect: Effect,
    cache: Arc<Mutex<HashMap<K, CacheEntry<R>>>>,
}

/// Project `source` through `factory`, memoized by item key.
///
/// The factory must not write the source cell; a projection that feeds its
/// own input is a cycle, which the runtime does not support.
pub fn mapped<K, R, F>(source: &Cell<Vec<K>>, factory: F) -> Mapped<K, R>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    F: Fn(&K) -> (R, Option<Cleanup>) + Send + Sync + 'static,
{
    // The output's change signal is "the projection ran", not result
    // equality, so the equality policy never absorbs a write.
    let output = Cell::with_equality(Vec::new(), |_: &Vec<R>, _: &Vec<R>| false);
    let cache = Arc::new(Mutex::new(HashMap::new()));

    let source = source.clone();
    let writer = output.clone();
    let shared = Arc::clone(&cache);
    let effect = Effect::new(move || {
        let items = source.get();

        // Take the cache out of its lock: factory and cleanup calls run
        // with no lock held.
        let mut previous = std::mem::take(&mut *shared.lock());
        let mut next: HashMap<K, CacheEntry<R>> = HashMap::with_capacity(items.len());
        let mut results = Vec::with_capacity(items.len());

        for item in &items {
            if let Some(entry) = next.get(item) {
                // Duplicate occurrence: share the cached entry.
                results.push(entry.result.clone());
                continue;
            }
            let entry = match previous.remove(item) {
                Some(entry) => entry,
                None => {
                    let (result, cleanup) = factory(item);
                    CacheEntry { result, cleanup }
                }
            };
            results.push(entry.result.clone());
            next.insert(item.clone(), entry);
        }

        // Whatever is left was dropped from the source.
        for (_, entry) in previous {
            if let Some(cleanup) = entry.cleanup {
                cleanup();
            }
        }

        *shared.lock() = next;
        writer.set(results);
    });

    Mapped {
        cell: output,
        effect,
        cache,
    }
}

impl<K, R> Mapped<K, R>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Get the projected sequence.
    ///
    /// If an effect is currently running, it becomes a subscriber and
    /// re-runs whenever the projection does.
    pub fn get(&self) -> Vec<R> {
        self.cell.get()
    }

    /// Get the projected sequence without subscribing.
    pub fn peek(&self) -> Vec<R> {
        self.cell.peek()
    }

    /// Stop the projection and run every outstanding item cleanup once.
    pub fn dispose(&self) {
        self.effect.dispose();
        let drained = std::mem::take(&mut *self.cache.lock());
        for (_, entry) in drained {
            if let Some(cleanup) = entry.cleanup {
                cleanup();
            }
        }
    }

    /// Check whether the projection has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.effect.is_disposed()
    }
}

impl<K, R> Clone for Mapped<K, R>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            effect: self.effect.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<K, R> Debug for Mapped<K, R>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    R: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapped")
            .field("results", &self.cell.peek())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Factory harness that counts calls and records cleanups per key.
    struct Harness {
        calls: Arc<Mutex<Vec<&'static str>>>,
        cleanups: Arc<Mutex<Vec<&'static str>>>,
        serial: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                cleanups: Arc::new(Mutex::new(Vec::new())),
                serial: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// A factory producing a uniquely-allocated result per call.
        fn factory(&self) -> impl Fn(&&'static str) -> (Arc<usize>, Option<Cleanup>) {
            let calls = self.calls.clone();
            let cleanups = self.cleanups.clone();
            let serial = self.serial.clone();
            move |item: &&'static str| {
                calls.lock().push(item);
                let result = Arc::new(serial.fetch_add(1, Ordering::SeqCst));
                let cleanups = cleanups.clone();
                let item = *item;
                let cleanup: Cleanup = Box::new(move || {
                    cleanups.lock().push(item);
                });
                (result, Some(cleanup))
            }
        }
    }

    #[test]
    fn items_map_in_source_order() {
        let source = Cell::new(vec!["a", "b", "c"]);
        let harness = Harness::new();
        let projected = mapped(&source, harness.factory());

        let results = projected.peek();
        assert_eq!(results.len(), 3);
        assert_eq!(*harness.calls.lock(), vec!["a", "b", "c"]);

        // Reordering the source reorders cached results without new calls.
        source.set(vec!["c", "a", "b"]);
        let reordered = projected.peek();
        assert!(Arc::ptr_eq(&reordered[0], &results[2]));
        assert!(Arc::ptr_eq(&reordered[1], &results[0]));
        assert!(Arc::ptr_eq(&reordered[2], &results[1]));
        assert_eq!(harness.calls.lock().len(), 3);

        projected.dispose();
    }

    #[test]
    fn surviving_items_reuse_their_cached_result() {
        let source = Cell::new(vec!["a", "b"]);
        let harness = Harness::new();
        let projected = mapped(&source, harness.factory());

        let before = projected.peek();

        source.set(vec!["b", "c"]);
        let after = projected.peek();

        // Only the newcomer hit the factory.
        assert_eq!(*harness.calls.lock(), vec!["a", "b", "c"]);

        // The departed item cleaned up exactly once.
        assert_eq!(*harness.cleanups.lock(), vec!["a"]);

        // The survivor kept the exact same allocation.
        assert!(Arc::ptr_eq(&after[0], &before[1]));

        projected.dispose();
    }

    #[test]
    fn duplicate_keys_share_one_entry() {
        let source = Cell::new(vec!["a", "a", "b"]);
        let harness = Harness::new();
        let projected = mapped(&source, harness.factory());

        let results = projected.peek();
        assert_eq!(results.len(), 3);
        assert!(Arc::ptr_eq(&results[0], &results[1]));
        assert_eq!(*harness.calls.lock(), vec!["a", "b"]);

        // Dropping every occurrence cleans up once.
        source.set(vec!["b"]);
        assert_eq!(*harness.cleanups.lock(), vec!["a"]);

        projected.dispose();
    }

    #[test]
    fn clearing_the_source_cleans_everything_up() {
        let source = Cell::new(vec!["a", "b"]);
        let harness = Harness::new();
        let projected = mapped(&source, harness.factory());

        source.set(Vec::new());
        assert!(projected.peek().is_empty());

        let mut cleaned = harness.cleanups.lock().clone();
        cleaned.sort_unstable();
        assert_eq!(cleaned, vec!["a", "b"]);

        projected.dispose();
        // Disposal finds nothing left to clean.
        assert_eq!(harness.cleanups.lock().len(), 2);
    }

    #[test]
    fn dispose_runs_outstanding_cleanups_once() {
        let source = Cell::new(vec!["a", "b"]);
        let harness = Harness::new();
        let projected = mapped(&source, harness.factory());

        projected.dispose();
        let mut cleaned = harness.cleanups.lock().clone();
        cleaned.sort_unstable();
        assert_eq!(cleaned, vec!["a", "b"]);

        // A second dispose has nothing left to do.
        projected.dispose();
        assert_eq!(harness.cleanups.lock().len(), 2);

        // Source writes after disposal no longer reach the projection.
        source.set(vec!["c"]);
        assert_eq!(harness.calls.lock().len(), 2);
    }

    #[test]
    fn projection_updates_reactively() {
        let source = Cell::new(vec![1, 2, 3]);
        let projected = mapped(&source, |n: &i32| (n * 10, None::<Cleanup>));

        assert_eq!(projected.peek(), vec![10, 20, 30]);

        source.set(vec![3, 4]);
        assert_eq!(projected.peek(), vec![30, 40]);

        projected.dispose();
    }
}
