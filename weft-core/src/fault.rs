//! Fault reporting for effect callbacks.
//!
//! A panic raised by an effect body or cleanup callback is contained by the
//! run protocol and surfaced here instead of propagating to the write that
//! triggered the run. By default faults are logged as `tracing` warnings;
//! hosts can install their own sink with [`set_fault_hook`] to route them
//! into whatever diagnostics channel they use.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use thiserror::Error;

use crate::subscribers::SubscriberId;

/// A contained panic from an effect body or cleanup callback.
///
/// The faulting node stays active: its next trigger produces a fresh run.
#[derive(Debug, Clone, Error)]
#[error("effect {effect} panicked: {message}")]
pub struct EffectFault {
    /// Id of the effect whose callback panicked.
    pub effect: SubscriberId,
    /// Rendered panic payload.
    pub message: String,
}

impl EffectFault {
    pub(crate) fn from_panic(effect: SubscriberId, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&'static str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "opaque panic payload".to_string()
        };
        Self { effect, message }
    }
}

type FaultHook = Arc<dyn Fn(&EffectFault) + Send + Sync>;

static HOOK: OnceLock<RwLock<Option<FaultHook>>> = OnceLock::new();

fn hook_slot() -> &'static RwLock<Option<FaultHook>> {
    HOOK.get_or_init(|| RwLock::new(None))
}

/// Install a process-wide fault sink, replacing the default `tracing` one.
pub fn set_fault_hook<F>(hook: F)
where
    F: Fn(&EffectFault) + Send + Sync + 'static,
{
    *hook_slot().write() = Some(Arc::new(hook));
}

/// Restore the default `tracing` fault sink.
pub fn clear_fault_hook() {
    *hook_slot().write() = None;
}

pub(crate) fn report(fault: EffectFault) {
    // Clone the hook out of the lock so a hook that swaps itself cannot
    // deadlock against the slot.
    let hook = {
        let guard = hook_slot().read();
        (*guard).clone()
    };
    match hook {
        Some(hook) => hook(&fault),
        None => tracing::warn!(effect = %fault.effect, "{}", fault),
    }
}
