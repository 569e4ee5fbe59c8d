//! Typed observer registration.
//!
//! Each semantic event gets its own [`Emitter`]. Registering a callback returns a
//! [`Subscription`] that removes it again. Callbacks may subscribe, dispose or clear while an
//! emission is in progress; those requests take effect once the emission finishes.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = Box<dyn FnMut(&T)>;

struct Handlers<T> {
    next_key: u64,
    entries: Vec<(u64, Callback<T>)>,
    emitting: bool,
    disposed_during_emit: Vec<u64>,
    cleared_during_emit: bool,
}

/// A list of callbacks for one event type.
pub struct Emitter<T> {
    handlers: Rc<RefCell<Handlers<T>>>,
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self {
            handlers: Rc::new(RefCell::new(Handlers {
                next_key: 0,
                entries: Vec::new(),
                emitting: false,
                disposed_during_emit: Vec::new(),
                cleared_during_emit: false,
            })),
        }
    }
}

impl<T: 'static> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("handlers", &self.len())
            .finish()
    }
}

impl<T: 'static> Emitter<T> {
    /// Create an emitter with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`; it runs on every subsequent [`Emitter::emit`].
    pub fn subscribe(&self, callback: impl FnMut(&T) + 'static) -> Subscription {
        let key = {
            let mut handlers = self.handlers.borrow_mut();
            let key = handlers.next_key;
            handlers.next_key += 1;
            handlers.entries.push((key, Box::new(callback)));
            key
        };
        let weak: Weak<RefCell<Handlers<T>>> = Rc::downgrade(&self.handlers);
        Subscription::new(move || {
            if let Some(handlers) = weak.upgrade() {
                let mut handlers = handlers.borrow_mut();
                if handlers.emitting {
                    handlers.disposed_during_emit.push(key);
                } else {
                    handlers.entries.retain(|(k, _)| *k != key);
                }
            }
        })
    }

    /// Invoke every registered callback with `value`.
    pub fn emit(&self, value: &T) {
        let mut running = {
            let mut handlers = self.handlers.borrow_mut();
            if handlers.emitting {
                // Re-entrant emission of the same event is dropped.
                return;
            }
            handlers.emitting = true;
            std::mem::take(&mut handlers.entries)
        };

        for (_, callback) in running.iter_mut() {
            callback(value);
        }

        let mut handlers = self.handlers.borrow_mut();
        handlers.emitting = false;
        if std::mem::take(&mut handlers.cleared_during_emit) {
            handlers.disposed_during_emit.clear();
            return;
        }
        let disposed = std::mem::take(&mut handlers.disposed_during_emit);
        running.retain(|(k, _)| !disposed.contains(k));
        let added = std::mem::take(&mut handlers.entries);
        running.extend(added);
        handlers.entries = running;
    }

    /// Drop every callback.
    pub fn clear(&self) {
        let mut handlers = self.handlers.borrow_mut();
        handlers.entries.clear();
        if handlers.emitting {
            handlers.cleared_during_emit = true;
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.handlers.borrow().entries.len()
    }

    /// Returns `true` if no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by `subscribe`; disposing it unregisters the callback.
///
/// Dropping the handle without disposing keeps the callback registered.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// Unregister the callback. Calling this more than once has no effect.
    pub fn dispose(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }

    /// Returns `true` once [`Subscription::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.dispose.is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_emit_and_dispose() {
        let emitter: Emitter<u32> = Emitter::new();
        let total = Rc::new(Cell::new(0));
        let t = total.clone();
        let mut sub = emitter.subscribe(move |v| t.set(t.get() + *v));

        emitter.emit(&3);
        emitter.emit(&4);
        assert_eq!(total.get(), 7);

        sub.dispose();
        assert!(sub.is_disposed());
        emitter.emit(&100);
        assert_eq!(total.get(), 7);
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_subscribe_during_emit_takes_effect_afterwards() {
        let emitter: Rc<Emitter<()>> = Rc::new(Emitter::new());
        let calls = Rc::new(Cell::new(0));

        let e = emitter.clone();
        let c = calls.clone();
        let _outer = emitter.subscribe(move |_| {
            c.set(c.get() + 1);
            let inner_calls = c.clone();
            let _ = e.subscribe(move |_| inner_calls.set(inner_calls.get() + 10));
        });

        emitter.emit(&());
        assert_eq!(calls.get(), 1);
        assert_eq!(emitter.len(), 2);
    }

    #[test]
    fn test_clear_during_emit() {
        let emitter: Rc<Emitter<()>> = Rc::new(Emitter::new());
        let e = emitter.clone();
        let _sub = emitter.subscribe(move |_| e.clear());
        emitter.emit(&());
        assert!(emitter.is_empty());
    }
}
