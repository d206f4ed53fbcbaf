//! Computed: a derived reactive value.
//!
//! A computed is a cell fed by an effect: the effect re-evaluates the
//! computation whenever an input changes and writes the result into an
//! internal cell. Because the write path applies the usual equality
//! short-circuit, consumers re-run only when the derived value itself
//! changes, no matter how often the inputs do.

use std::fmt::Debug;

use crate::cell::Cell;
use crate::effect::Effect;

/// A derived value recomputed whenever one of its inputs changes.
///
/// # Example
///
/// ```rust,ignore
/// let count = Cell::new(2);
///
/// let reader = count.clone();
/// let doubled = Computed::new(move || reader.get() * 2);
/// assert_eq!(doubled.get(), 4);
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    cell: Cell<Option<T>>,
    effect: Effect,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a computed and evaluate it once immediately.
    ///
    /// `compute` must not write cells it also reads; cyclic graphs are not
    /// supported.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let cell = Cell::new(None);
        let writer = cell.clone();
        let effect = Effect::new(move || {
            writer.set(Some(compute()));
        });
        Self { cell, effect }
    }
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Get the current derived value.
    ///
    /// If an effect is currently running, it becomes a subscriber and
    /// re-runs when the derived value changes.
    pub fn get(&self) -> T {
        self.cell
            .get()
            .expect("computed cell holds a value after the first run")
    }

    /// Get the current derived value without subscribing.
    pub fn peek(&self) -> T {
        self.cell
            .peek()
            .expect("computed cell holds a value after the first run")
    }

    /// Stop recomputation permanently.
    pub fn dispose(&self) {
        self.effect.dispose();
    }

    /// Check whether the computed has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.effect.is_disposed()
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            effect: self.effect.clone(),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("value", &self.cell.peek())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
