//! Weft Core
//!
//! This crate provides the core runtime for the Weft fine-grained reactive
//! state engine. It implements:
//!
//! - Reactive primitives (cells, computed values, effects)
//! - Automatic dependency tracking
//! - Write batching with coalesced notification
//! - Change observation and keyed collection projection
//!
//! The crate is designed to be used both as a native Rust library and,
//! optionally, as a Python extension module via PyO3 (enable the `python`
//! feature).
//!
//! # How it works
//!
//! A [`Cell`] is a container for mutable state. When a cell is read while an
//! effect is running, the cell registers that effect as a subscriber. When
//! the cell's value changes, subscribers re-run: immediately, or once per
//! flush when the writes happen inside [`batch`]. Before each re-run an
//! effect detaches from everything it read last time, so its subscriptions
//! always mirror its most recent execution.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::{batch, Cell, Computed, Effect};
//!
//! let count = Cell::new(0);
//!
//! let reader = count.clone();
//! let doubled = Computed::new(move || reader.get() * 2);
//!
//! let doubled_reader = doubled.clone();
//! let effect = Effect::new(move || {
//!     println!("doubled is {}", doubled_reader.get());
//! });
//!
//! batch(|| {
//!     count.set(2);
//!     count.set(5);
//! });
//! // Effect ran once more, printing: "doubled is 10"
//!
//! effect.dispose();
//! doubled.dispose();
//! ```
//!
//! # Single logical thread
//!
//! Cells and handles are `Send + Sync`, but the execution context and the
//! batch queue are thread-local: one logical thread of control (a frame or
//! tick loop, typically) is expected to drive all reads and writes.

mod batch;
mod cell;
mod computed;
mod context;
mod effect;
mod fault;
mod mapped;
mod observe;
mod subscribers;

pub use batch::batch;
#[cfg(feature = "python")]
pub use cell::PyCell;
pub use cell::{Cell, EqualsFn};
pub use computed::Computed;
pub use context::{is_tracking, untracked};
pub use effect::{Cleanup, Effect};
pub use fault::{clear_fault_hook, set_fault_hook, EffectFault};
pub use mapped::{mapped, Mapped};
pub use subscribers::SubscriberId;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module definition.
///
/// This function is called by Python when importing the module.
/// It registers all Python-exposed types and functions.
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Register reactive primitives
    m.add_class::<cell::PyCell>()?;

    // Add version info
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
