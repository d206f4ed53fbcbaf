//! Subscriber bookkeeping for the reactive system.
//!
//! Every effect node carries a `SubscriberId`, and every cell owns a
//! `SubscriberSet` of the effects that read it during their latest run.
//! The set stores weak references, so a cell never keeps an effect alive.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::context;
use crate::effect::EffectInner;

/// Unique identifier for an effect node.
///
/// Each node gets a unique ID when created. The ID is what de-duplicates
/// subscriptions and batch-queue entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type SetInner = IndexMap<SubscriberId, Weak<EffectInner>>;

/// The de-duplicated, insertion-ordered set of effects attached to one cell.
///
/// Iteration always happens over a snapshot copied out under the lock, so an
/// effect that detaches or re-attaches subscribers mid-notification cannot
/// corrupt the walk.
#[derive(Clone)]
pub(crate) struct SubscriberSet {
    inner: Arc<RwLock<SetInner>>,
}

impl SubscriberSet {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Attach the currently running effect, if any.
    ///
    /// Records the subscription on both ends: the effect joins this set, and
    /// this set joins the effect's dependency list so the effect can detach
    /// itself before its next run.
    pub(crate) fn subscribe_current(&self) {
        let Some((id, weak)) = context::current() else {
            return;
        };
        let Some(effect) = weak.upgrade() else {
            return;
        };
        if !effect.is_active() {
            return;
        }
        self.inner.write().insert(id, weak);
        effect.push_dependency(self.downgrade());
    }

    pub(crate) fn remove(&self, id: SubscriberId) {
        self.inner.write().shift_remove(&id);
    }

    /// Copy out the live subscribers, pruning entries whose effect is gone.
    pub(crate) fn snapshot(&self) -> Vec<Arc<EffectInner>> {
        let mut live = Vec::new();
        self.inner.write().retain(|_, weak| match weak.upgrade() {
            Some(effect) => {
                live.push(effect);
                true
            }
            None => false,
        });
        live
    }

    /// Copy out raw entries, for handing to the batch queue.
    pub(crate) fn entries(&self) -> Vec<(SubscriberId, Weak<EffectInner>)> {
        self.inner
            .read()
            .iter()
            .map(|(id, weak)| (*id, Weak::clone(weak)))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub(crate) fn downgrade(&self) -> WeakSubscriberSet {
        WeakSubscriberSet {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak handle to a cell's subscriber set, held by effects.
///
/// Used only to detach: if the owning cell is gone, there is nothing left to
/// detach from.
#[derive(Clone)]
pub(crate) struct WeakSubscriberSet {
    inner: Weak<RwLock<SetInner>>,
}

impl WeakSubscriberSet {
    pub(crate) fn remove(&self, id: SubscriberId) {
        if let Some(set) = self.inner.upgrade() {
            set.write().shift_remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn snapshot_prunes_dead_entries() {
        let set = SubscriberSet::new();
        let id = SubscriberId::new();

        // A weak reference with no live owner never upgrades.
        set.inner.write().insert(id, Weak::new());
        assert_eq!(set.len(), 1);

        assert!(set.snapshot().is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn remove_is_a_no_op_for_unknown_ids() {
        let set = SubscriberSet::new();
        set.remove(SubscriberId::new());
        assert_eq!(set.len(), 0);
    }
}
