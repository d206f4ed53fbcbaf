//! Cell: the mutable reactive value slot.
//!
//! # How cells work
//!
//! 1. When a cell is read while an effect is running, the cell registers
//!    that effect as a subscriber.
//!
//! 2. When a cell's value changes, all subscribers re-run (immediately, or
//!    once per flush while a batch is open).
//!
//! 3. Writing a value equal to the current one is a no-op: the value is
//!    kept and nobody is notified. Equality is a per-cell policy fixed at
//!    construction.
//!
//! # Thread safety
//!
//! The value sits behind a lock and handles are `Send + Sync`, but
//! notification state (execution context, batch queue) is thread-local:
//! the runtime expects a single logical thread of control to drive all
//! reads and writes.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::batch;
use crate::context::untracked;
use crate::subscribers::SubscriberSet;

/// Per-cell equality policy used by the write no-op check.
pub type EqualsFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Counter for generating unique cell IDs.
static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_cell_id() -> u64 {
    CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = Cell::new(0);
///
/// // Read the value (subscribes the running effect, if any)
/// let value = count.get();
///
/// // Replace the value (notifies subscribers when it changed)
/// count.set(5);
/// ```
pub struct Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Unique identifier for this cell.
    id: u64,

    /// The current value.
    value: Arc<RwLock<T>>,

    /// Effects that read this cell during their latest run.
    subscribers: SubscriberSet,

    /// Equality policy for the write no-op check.
    equals: EqualsFn<T>,
}

impl<T> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cell that compares values with `==`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(value, |a: &T, b: &T| a == b)
    }

    /// Create a cell with an explicit equality policy.
    ///
    /// The policy decides whether a write is a no-op. Use
    /// `|a, b| Arc::ptr_eq(a, b)` for identity semantics on shared
    /// payloads, or `|_, _| false` to notify on every write.
    pub fn with_equality<F>(value: T, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            id: next_cell_id(),
            value: Arc::new(RwLock::new(value)),
            subscribers: SubscriberSet::new(),
            equals: Arc::new(equals),
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the current value.
    ///
    /// If an effect is currently running, it becomes a subscriber of this
    /// cell until its next run or disposal.
    pub fn get(&self) -> T {
        self.subscribers.subscribe_current();
        (*self.value.read()).clone()
    }

    /// Get the current value without subscribing.
    ///
    /// Tracking is suspended only for the duration of the read; an effect
    /// that peeks a cell keeps every subscription it picked up elsewhere.
    pub fn peek(&self) -> T {
        untracked(|| self.get())
    }

    /// Replace the value and notify subscribers, returning what is stored.
    ///
    /// When the equality policy considers `value` equal to the current
    /// one, nothing is stored and nobody is notified.
    pub fn set(&self, value: T) -> T {
        let current = (*self.value.read()).clone();
        if (self.equals)(&current, &value) {
            return current;
        }

        *self.value.write() = value.clone();
        self.notify();
        value
    }

    /// Derive the next value from the current one.
    pub fn update<F>(&self, f: F) -> T
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let guard = self.value.read();
            f(&guard)
        };
        self.set(next)
    }

    /// Number of effects currently subscribed to this cell.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn values_equal(&self, a: &T, b: &T) -> bool {
        (self.equals)(a, b)
    }

    /// Run or enqueue every subscriber.
    ///
    /// The subscriber set is snapshotted first; an effect that detaches or
    /// attaches subscribers of this same cell mid-notification mutates the
    /// live set, not the snapshot.
    fn notify(&self) {
        if batch::is_batching() {
            for (id, weak) in self.subscribers.entries() {
                batch::enqueue(id, weak);
            }
        } else {
            for effect in self.subscribers.snapshot() {
                if effect.is_active() {
                    effect.run();
                }
            }
        }
    }
}

impl<T> Clone for Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            subscribers: self.subscribers.clone(),
            equals: Arc::clone(&self.equals),
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id)
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Python Bindings
// ----------------------------------------------------------------------------

#[cfg(feature = "python")]
mod py {
    use std::sync::Arc;

    use parking_lot::RwLock;
    use pyo3::prelude::*;
    use pyo3::types::PyAny;

    use super::next_cell_id;

    /// Python-exposed cell type.
    ///
    /// A standalone value slot for Python that handles PyO3's reference
    /// counting properly. `Py<PyAny>` is GIL-independent and can be shared
    /// across threads.
    #[pyclass(name = "Cell")]
    pub struct PyCell {
        /// Unique identifier for this cell.
        id: u64,

        /// The current value.
        value: Arc<RwLock<Py<PyAny>>>,

        /// Number of subscribers (simplified for the binding).
        subscriber_count: Arc<RwLock<usize>>,
    }

    #[pymethods]
    impl PyCell {
        /// Create a new cell with the given initial value.
        #[new]
        fn new(value: PyObject) -> Self {
            Self {
                id: next_cell_id(),
                value: Arc::new(RwLock::new(value)),
                subscriber_count: Arc::new(RwLock::new(0)),
            }
        }

        /// Get the current value.
        #[getter]
        fn value(&self, py: Python<'_>) -> PyObject {
            self.value.read().clone_ref(py)
        }

        /// Set a new value.
        #[setter]
        fn set_value(&self, value: PyObject) {
            *self.value.write() = value;
        }

        /// Get the cell's unique ID.
        #[getter]
        fn id(&self) -> u64 {
            self.id
        }

        /// Get the number of subscribers.
        fn subscriber_count(&self) -> usize {
            *self.subscriber_count.read()
        }

        fn __repr__(&self, py: Python<'_>) -> String {
            let value = self.value.read();
            let repr = value
                .bind(py)
                .repr()
                .map(|r| r.to_string())
                .unwrap_or_else(|_| "?".to_string());
            format!(
                "Cell(id={}, value={}, subscribers={})",
                self.id,
                repr,
                self.subscriber_count()
            )
        }
    }
}

#[cfg(feature = "python")]
pub use py::PyCell;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    use crate::effect::Effect;

    #[test]
    fn cell_get_and_set() {
        let cell = Cell::new(0);
        assert_eq!(cell.get(), 0);

        cell.set(42);
        assert_eq!(cell.get(), 42);
    }

    #[test]
    fn set_returns_the_stored_value() {
        let cell = Cell::new(0);
        assert_eq!(cell.set(5), 5);

        // Equal write: the stored value comes back and nothing changes.
        assert_eq!(cell.set(5), 5);
        assert_eq!(cell.get(), 5);
    }

    #[test]
    fn cell_update() {
        let cell = Cell::new(10);
        assert_eq!(cell.update(|v| v + 5), 15);
        assert_eq!(cell.get(), 15);
    }

    #[test]
    fn equal_write_does_not_notify() {
        let cell = Cell::new(7);
        let runs = Arc::new(AtomicI32::new(0));

        let reader = cell.clone();
        let counter = runs.clone();
        let effect = Effect::new(move || {
            reader.get();
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        cell.set(8);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        effect.dispose();
    }

    #[test]
    fn custom_equality_policy_controls_notification() {
        // Always-unequal: every write notifies, even with the same value.
        let cell = Cell::with_equality(1, |_: &i32, _: &i32| false);
        let runs = Arc::new(AtomicI32::new(0));

        let reader = cell.clone();
        let counter = runs.clone();
        let effect = Effect::new(move || {
            reader.get();
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(1);
        cell.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        effect.dispose();
    }

    #[test]
    fn identity_equality_policy() {
        let first = Arc::new(5);
        let same_value = Arc::new(5);

        let cell = Cell::with_equality(Arc::clone(&first), |a: &Arc<i32>, b: &Arc<i32>| {
            Arc::ptr_eq(a, b)
        });
        let runs = Arc::new(AtomicI32::new(0));

        let reader = cell.clone();
        let counter = runs.clone();
        let effect = Effect::new(move || {
            reader.get();
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Same allocation: no-op.
        cell.set(first);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Equal payload, distinct allocation: notifies.
        cell.set(same_value);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        effect.dispose();
    }

    #[test]
    fn peek_never_subscribes() {
        let tracked = Cell::new(0);
        let peeked = Cell::new(0);
        let runs = Arc::new(AtomicI32::new(0));

        let tracked_reader = tracked.clone();
        let peeked_reader = peeked.clone();
        let counter = runs.clone();
        let effect = Effect::new(move || {
            tracked_reader.get();
            peeked_reader.peek();
            counter.fetch_add(1, Ordering::SeqCst);
        });

        peeked.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(peeked.subscriber_count(), 0);

        // Tracking resumed after the peek: normal reads still subscribe.
        tracked.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        effect.dispose();
    }

    #[test]
    fn peek_between_tracked_reads_keeps_tracking_intact() {
        let cell = Cell::new(0);
        let runs = Arc::new(AtomicI32::new(0));

        let reader = cell.clone();
        let counter = runs.clone();
        let effect = Effect::new(move || {
            reader.get();
            reader.peek();
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Peeking a cell the effect also reads must not detach it.
        cell.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        effect.dispose();
    }

    #[test]
    fn cell_clone_shares_state() {
        let cell1 = Cell::new(0);
        let cell2 = cell1.clone();

        cell1.set(42);
        assert_eq!(cell2.get(), 42);

        cell2.set(100);
        assert_eq!(cell1.get(), 100);
    }

    #[test]
    fn cell_ids_are_unique() {
        let c1 = Cell::new(0);
        let c2 = Cell::new(0);
        let c3 = Cell::new(0);

        assert_ne!(c1.id(), c2.id());
        assert_ne!(c2.id(), c3.id());
        assert_ne!(c1.id(), c3.id());
    }

    #[test]
    fn subscriber_count_tracks_disposal() {
        let cell = Cell::new(0);

        let reader = cell.clone();
        let effect = Effect::new(move || {
            reader.get();
        });
        assert_eq!(cell.subscriber_count(), 1);

        effect.dispose();
        assert_eq!(cell.subscriber_count(), 0);

        // Writes after disposal are well-defined no-ops for the effect.
        cell.set(3);
        assert_eq!(cell.get(), 3);
    }
}
