//! Effect nodes: re-runnable side-effecting computations.
//!
//! # How effects work
//!
//! 1. When created, the effect runs its body immediately to establish
//!    initial subscriptions.
//!
//! 2. When any subscribed cell changes, the effect re-runs.
//!
//! 3. Before re-running, the effect invokes the cleanup left by its
//!    previous run and detaches from every cell it was subscribed to, then
//!    tracks fresh subscriptions during execution. Detaching first means a
//!    cell read only on a branch no longer taken cannot re-trigger the
//!    effect.
//!
//! # Cleanup
//!
//! A body registered with [`Effect::with_cleanup`] may return a callback.
//! It runs before the next body execution and once more on disposal, so
//! resources acquired by one run never outlive it by more than one
//! generation.
//!
//! # Faults
//!
//! A panic inside the body or a cleanup is contained: it is reported
//! through the fault channel (see [`EffectFault`]) and never reaches the
//! write that triggered the run. A faulted run discards its return value;
//! the node stays active and re-runs on its next trigger.
//!
//! # Lifetime
//!
//! A process-wide registry holds one strong reference per undisposed node,
//! so an effect keeps running even after the host drops its [`Effect`]
//! handle. Disposal through [`Effect::dispose`] is the only way a node is
//! torn down; hosts that never dispose leak the node.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::context::TrackingScope;
use crate::fault::{self, EffectFault};
use crate::subscribers::{SubscriberId, WeakSubscriberSet};

/// Cleanup callback returned by an effect body.
pub type Cleanup = Box<dyn FnOnce() + Send>;

type BodyFn = Box<dyn Fn() -> Option<Cleanup> + Send + Sync>;

// Process-wide keep-alive registry. Holds the strong reference for every
// undisposed node; disposal removes the entry.
static REGISTRY: OnceLock<RwLock<HashMap<SubscriberId, Arc<EffectInner>>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<SubscriberId, Arc<EffectInner>>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

pub(crate) struct EffectInner {
    id: SubscriberId,

    /// False once disposed. Checked at the top of every run.
    active: AtomicBool,

    /// The effect body, normalized to return an optional cleanup.
    body: BodyFn,

    /// Cleanup left by the previous run, if any. At most one outstanding.
    cleanup: Mutex<Option<Cleanup>>,

    /// Subscriber sets this node is currently attached to, in attach order.
    /// Weak handles: used only to detach.
    dependencies: Mutex<SmallVec<[WeakSubscriberSet; 4]>>,
}

impl EffectInner {
    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn push_dependency(&self, set: WeakSubscriberSet) {
        self.dependencies.lock().push(set);
    }

    /// Execute one generation of the effect.
    ///
    /// Protocol: bail if inactive; run and clear the previous cleanup;
    /// detach from every subscribed set; execute the body under the
    /// execution context with panic containment; store any returned
    /// cleanup. The context is restored even when the body panics.
    pub(crate) fn run(self: &Arc<Self>) {
        if !self.is_active() {
            return;
        }

        let previous_cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = previous_cleanup {
            invoke_cleanup(self.id, cleanup);
        }

        let dependencies = std::mem::take(&mut *self.dependencies.lock());
        for set in &dependencies {
            set.remove(self.id);
        }

        let result = {
            let _scope = TrackingScope::enter(self);
            catch_unwind(AssertUnwindSafe(|| (self.body)()))
        };

        match result {
            Ok(next_cleanup) => *self.cleanup.lock() = next_cleanup,
            Err(payload) => fault::report(EffectFault::from_panic(self.id, payload)),
        }
    }

    fn dispose(&self) {
        // Idempotent: the first disposer call wins, later ones see the
        // flag already cleared.
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        let outstanding = self.cleanup.lock().take();
        if let Some(cleanup) = outstanding {
            invoke_cleanup(self.id, cleanup);
        }

        let dependencies = std::mem::take(&mut *self.dependencies.lock());
        for set in &dependencies {
            set.remove(self.id);
        }

        registry().write().remove(&self.id);
    }
}

fn invoke_cleanup(id: SubscriberId, cleanup: Cleanup) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(cleanup)) {
        fault::report(EffectFault::from_panic(id, payload));
    }
}

/// Handle to a running effect.
///
/// The handle is cheap to clone; clones share the node. Dropping every
/// handle does not stop the effect; only [`Effect::dispose`] does.
///
/// # Example
///
/// ```rust,ignore
/// let count = Cell::new(0);
///
/// let reader = count.clone();
/// let effect = Effect::new(move || {
///     println!("count is {}", reader.get());
/// });
///
/// count.set(5); // prints: "count is 5"
/// effect.dispose();
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create an effect with the given body and run it once immediately.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::create(Box::new(move || {
            body();
            None
        }))
    }

    /// Create an effect whose body may return a cleanup callback.
    ///
    /// The cleanup runs before the next body execution, or on disposal,
    /// whichever comes first.
    pub fn with_cleanup<F, C>(body: F) -> Self
    where
        F: Fn() -> Option<C> + Send + Sync + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self::create(Box::new(move || {
            body().map(|cleanup| Box::new(cleanup) as Cleanup)
        }))
    }

    fn create(body: BodyFn) -> Self {
        let inner = Arc::new(EffectInner {
            id: SubscriberId::new(),
            active: AtomicBool::new(true),
            body,
            cleanup: Mutex::new(None),
            dependencies: Mutex::new(SmallVec::new()),
        });

        registry().write().insert(inner.id, Arc::clone(&inner));

        // First run establishes the initial subscription set before the
        // constructor returns.
        inner.run();

        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Permanently deactivate the effect.
    ///
    /// Runs the outstanding cleanup (if any), detaches from every
    /// subscribed cell, and releases the node. Calling this more than once
    /// is a no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        !self.inner.is_active()
    }

    /// Number of subscriber-set attachments recorded by the latest run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
