//! Cleanup scopes for mounted render roots.
//!
//! Every resource a root acquires after mounting (store subscriptions,
//! spawned tasks, listeners) registers a cleanup on the root's [`Owner`].
//! Disposing the owner, explicitly or by dropping it, releases all of them.

use std::cell::{Cell, RefCell};

#[derive(Default)]
pub struct Owner {
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    disposed: Cell<bool>,
}

impl Owner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup callback. Callbacks run in reverse order of
    /// registration. Registering on a disposed owner runs `f` immediately.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        if self.disposed.get() {
            f();
            return;
        }
        self.cleanups.borrow_mut().push(Box::new(f));
    }

    /// Keep `value` alive until the owner is disposed.
    pub fn retain<T: 'static>(&self, value: T) {
        self.on_cleanup(move || drop(value));
    }

    /// Run all cleanups (LIFO). Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_on_cleanup_reverse_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let owner = Owner::new();
        for name in ["first", "second", "third"] {
            let order = order.clone();
            owner.on_cleanup(move || order.borrow_mut().push(name));
        }

        owner.dispose();

        assert_eq!(*order.borrow(), vec!["third", "second", "first"]);
    }

    #[test]
    fn test_dispose_twice_is_safe() {
        let calls = Rc::new(Cell::new(0));
        let owner = Owner::new();
        let c = calls.clone();
        owner.on_cleanup(move || c.set(c.get() + 1));

        owner.dispose();
        owner.dispose();
        drop(owner);

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_drop_disposes() {
        let calls = Rc::new(Cell::new(0));
        {
            let owner = Owner::new();
            let c = calls.clone();
            owner.on_cleanup(move || c.set(c.get() + 1));
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_cleanup_after_dispose_runs_immediately() {
        let owner = Owner::new();
        owner.dispose();
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        owner.on_cleanup(move || r.set(true));
        assert!(ran.get());
        assert!(owner.is_disposed());
    }

    #[test]
    fn test_retain_drops_value_on_dispose() {
        let marker = Rc::new(());
        let owner = Owner::new();
        owner.retain(marker.clone());
        assert_eq!(Rc::strong_count(&marker), 2);
        owner.dispose();
        assert_eq!(Rc::strong_count(&marker), 1);
    }
}
