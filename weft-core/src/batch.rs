//! Write batching.
//!
//! While a batch is open, cell writes park their subscribers in a pending
//! queue instead of running them. The queue is drained exactly once, when
//! the outermost batch exits, and it de-duplicates by effect id: N writes
//! to M cells inside one batch produce at most one run per affected,
//! still-active effect.
//!
//! The flag and queue are thread-local, like the execution context: one
//! logical thread of control drives all reads and writes.

use std::cell::RefCell;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Weak;

use indexmap::IndexMap;

use crate::effect::EffectInner;
use crate::subscribers::SubscriberId;

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::new());
}

struct BatchState {
    batching: bool,
    queue: IndexMap<SubscriberId, Weak<EffectInner>>,
}

impl BatchState {
    fn new() -> Self {
        Self {
            batching: false,
            queue: IndexMap::new(),
        }
    }
}

pub(crate) fn is_batching() -> bool {
    BATCH.with(|state| state.borrow().batching)
}

pub(crate) fn enqueue(id: SubscriberId, effect: Weak<EffectInner>) {
    BATCH.with(|state| {
        state.borrow_mut().queue.insert(id, effect);
    });
}

/// Run `body` with notifications deferred, flushing once on exit.
///
/// Nested calls only flush at the outermost exit. A panic from `body` is
/// re-raised to the caller, but only after the batching flag is restored
/// and (for the outermost call) the queue is drained, so writes that
/// happened before the panic are still delivered and the queue is never
/// left populated.
pub fn batch<R>(body: impl FnOnce() -> R) -> R {
    let saved = BATCH.with(|state| std::mem::replace(&mut state.borrow_mut().batching, true));

    let result = catch_unwind(AssertUnwindSafe(body));

    BATCH.with(|state| state.borrow_mut().batching = saved);
    if !saved {
        flush();
    }

    match result {
        Ok(value) => value,
        Err(payload) => resume_unwind(payload),
    }
}

/// Drain the pending queue: snapshot it, clear it, run what is still alive
/// and active.
fn flush() {
    let pending = BATCH.with(|state| std::mem::take(&mut state.borrow_mut().queue));
    for (_, weak) in pending {
        if let Some(effect) = weak.upgrade() {
            if effect.is_active() {
                effect.run();
            }
        }
    }
}
