//! Keyed property store shared between the controller and mounted roots.
//!
//! Values live under a `(store name, canvas id)` pair. The controller is the
//! only writer; render roots read a value once at mount time and subscribe to
//! later [`PropertyStore::set`] calls for as long as they hold the returned
//! [`StoreSubscription`]. This is how `updateProps` reaches a running scene
//! without remounting it.

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::protocol::CanvasId;

/// Store holding each canvas' current [`PropsRecord`](crate::props::PropsRecord).
pub const PROPS_STORE: &str = "canvasProps";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub store: &'static str,
    pub id: CanvasId,
}

impl StoreKey {
    pub fn new(store: &'static str, id: CanvasId) -> Self {
        Self { store, id }
    }

    pub fn props(id: CanvasId) -> Self {
        Self::new(PROPS_STORE, id)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store, self.id)
    }
}

type ReaderId = u64;
type Reader = Rc<dyn Fn(&dyn Any)>;

#[derive(Default)]
struct Slot {
    value: Option<Rc<dyn Any>>,
    readers: Vec<(ReaderId, Reader)>,
}

#[derive(Default)]
struct StoreInner {
    slots: HashMap<StoreKey, Slot>,
    next_reader: ReaderId,
}

/// Cloning yields another handle to the same store.
#[derive(Clone, Default)]
pub struct PropertyStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value under `key` and notify every subscribed reader,
    /// synchronously and in subscription order.
    pub fn set<T: 'static>(&self, key: &StoreKey, value: T) {
        let value: Rc<dyn Any> = Rc::new(value);
        let readers: Vec<Reader> = {
            let mut inner = self.inner.borrow_mut();
            let slot = inner.slots.entry(key.clone()).or_default();
            slot.value = Some(value.clone());
            slot.readers.iter().map(|(_, reader)| reader.clone()).collect()
        };

        log::debug!("Store {key} set, notifying {} reader(s)", readers.len());
        for reader in readers {
            reader(value.as_ref());
        }
    }

    /// The current value under `key`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the stored value is not a `T`.
    pub fn read<T: Clone + 'static>(&self, key: &StoreKey) -> Option<T> {
        let value = self
            .inner
            .borrow()
            .slots
            .get(key)
            .and_then(|slot| slot.value.clone())?;
        Some(downcast::<T>(key, value.as_ref()).clone())
    }

    /// Read the value under `key` (or `fallback` when unset) and subscribe
    /// `on_change` to every later `set` for the same key.
    ///
    /// The subscription lasts until the returned guard is dropped.
    pub fn use_read<T, F>(&self, key: &StoreKey, fallback: T, on_change: F) -> (T, StoreSubscription)
    where
        T: Clone + 'static,
        F: Fn(&T) + 'static,
    {
        let current = self.read::<T>(key).unwrap_or(fallback);

        let reader_key = key.clone();
        let reader: Reader = Rc::new(move |value: &dyn Any| {
            on_change(downcast::<T>(&reader_key, value));
        });

        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_reader;
            inner.next_reader += 1;
            inner
                .slots
                .entry(key.clone())
                .or_default()
                .readers
                .push((id, reader));
            id
        };

        let subscription = StoreSubscription {
            store: Rc::downgrade(&self.inner),
            key: key.clone(),
            id,
        };
        (current, subscription)
    }

    /// Drop the value under `key`. Subscribed readers stay subscribed.
    pub fn remove(&self, key: &StoreKey) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(slot) = inner.slots.get_mut(key) else {
            return false;
        };
        let had_value = slot.value.take().is_some();
        if slot.readers.is_empty() {
            inner.slots.remove(key);
        }
        had_value
    }

    pub fn contains(&self, key: &StoreKey) -> bool {
        self.inner
            .borrow()
            .slots
            .get(key)
            .is_some_and(|slot| slot.value.is_some())
    }

    pub fn reader_count(&self, key: &StoreKey) -> usize {
        self.inner
            .borrow()
            .slots
            .get(key)
            .map_or(0, |slot| slot.readers.len())
    }
}

fn downcast<'a, T: 'static>(key: &StoreKey, value: &'a dyn Any) -> &'a T {
    value.downcast_ref::<T>().unwrap_or_else(|| {
        panic!(
            "Store {key} holds a value that is not a `{}`",
            type_name::<T>()
        )
    })
}

/// Keeps a [`PropertyStore::use_read`] subscription alive.
pub struct StoreSubscription {
    store: Weak<RefCell<StoreInner>>,
    key: StoreKey,
    id: ReaderId,
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        let mut inner = store.borrow_mut();
        let Some(slot) = inner.slots.get_mut(&self.key) else {
            return;
        };
        slot.readers.retain(|(id, _)| *id != self.id);
        if slot.readers.is_empty() && slot.value.is_none() {
            inner.slots.remove(&self.key);
        }
    }
}
