//! Execution context for dependency tracking.
//!
//! The context is a thread-local, single-slot pointer to "the effect
//! currently running". When a cell is read, the slot tells it which effect
//! to attach as a subscriber.
//!
//! # Implementation
//!
//! Scopes save the previous slot value on entry and restore it on drop.
//! This save/restore discipline (rather than a bare assignment or a boolean
//! toggle) is what keeps nesting correct: an effect that runs another
//! effect, or an untracked region opened inside an effect, always hands the
//! slot back to whoever held it before, including when the inner scope
//! unwinds from a panic.

use std::cell::RefCell;
use std::sync::{Arc, Weak};

use crate::effect::EffectInner;
use crate::subscribers::SubscriberId;

thread_local! {
    static CURRENT: RefCell<Option<(SubscriberId, Weak<EffectInner>)>> = RefCell::new(None);
}

/// Guard that restores the previous context slot when dropped.
pub(crate) struct TrackingScope {
    saved: Option<(SubscriberId, Weak<EffectInner>)>,
}

impl TrackingScope {
    /// Point the slot at `effect` for the duration of the scope.
    pub(crate) fn enter(effect: &Arc<EffectInner>) -> Self {
        let saved = CURRENT.with(|slot| {
            slot.borrow_mut()
                .replace((effect.id(), Arc::downgrade(effect)))
        });
        Self { saved }
    }

    /// Clear the slot for the duration of the scope.
    pub(crate) fn suspend() -> Self {
        let saved = CURRENT.with(|slot| slot.borrow_mut().take());
        Self { saved }
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        let saved = self.saved.take();
        CURRENT.with(|slot| *slot.borrow_mut() = saved);
    }
}

/// The currently running effect, if any.
pub(crate) fn current() -> Option<(SubscriberId, Weak<EffectInner>)> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Check whether reads on this thread are currently being tracked.
pub fn is_tracking() -> bool {
    CURRENT.with(|slot| slot.borrow().is_some())
}

/// Run `f` with dependency tracking suspended.
///
/// Cell reads inside `f` do not subscribe the surrounding effect, and
/// tracking resumes as soon as `f` returns. Regions nest freely.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _scope = TrackingScope::suspend();
    f()
}
