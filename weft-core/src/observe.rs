//! Change observation over cells.
//!
//! Both helpers are plain effects over the public cell surface; they get
//! no privileged access to the runtime.

use parking_lot::Mutex;

use crate::cell::Cell;
use crate::effect::Effect;

impl<T> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Call `callback(new, old)` whenever this cell's value changes.
    ///
    /// The starting point is captured untracked at registration; the
    /// callback fires only for changes after that, compared with this
    /// cell's own equality policy. The remembered value is advanced before
    /// the callback runs, so a panicking callback cannot see the same
    /// transition twice.
    pub fn observe<F>(&self, callback: F) -> Effect
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let cell = self.clone();
        let remembered = Mutex::new(self.peek());
        Effect::new(move || {
            let next = cell.get();
            let previous = {
                let mut guard = remembered.lock();
                if cell.values_equal(&next, &guard) {
                    return;
                }
                std::mem::replace(&mut *guard, next.clone())
            };
            callback(&next, &previous);
        })
    }

    /// Call `callback(value)` on every run, including the first.
    pub fn subscribe<F>(&self, callback: F) -> Effect
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let cell = self.clone();
        Effect::new(move || callback(&cell.get()))
    }
}
