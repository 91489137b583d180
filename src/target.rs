//! Element-shaped stand-in for the host-owned canvas.
//!
//! The renderer's interaction layer is written against a small element
//! contract: size getters, a bounding rect, listener registration, focus and
//! pointer capture. [`ProxyTarget`] implements that contract from data the
//! host forwards, so the same interaction code runs without a real input
//! device.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::event::{DispatchedEvent, EventRecord};

/// A layout rectangle in host client coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClientRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub right: f64,
    pub bottom: f64,
}

impl ClientRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
            right: left + width,
            bottom: top + height,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// Geometry queries the interaction layer makes on its element.
pub trait LayoutSource {
    fn client_width(&self) -> f64;
    fn client_height(&self) -> f64;
    fn bounding_client_rect(&self) -> ClientRect;
}

pub type Listener = Rc<dyn Fn(&DispatchedEvent)>;

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener registration plus the focus and capture calls the interaction
/// layer makes on its element.
pub trait EventTarget {
    fn add_event_listener(&self, kind: &str, listener: Listener) -> ListenerId;
    fn remove_event_listener(&self, kind: &str, id: ListenerId);
    /// Notify listeners registered for the event's type. Returns how many
    /// were invoked.
    fn dispatch_event(&self, event: &DispatchedEvent) -> usize;
    fn focus(&self);
    fn set_pointer_capture(&self, pointer_id: i32);
    fn release_pointer_capture(&self, pointer_id: i32);
}

/// What [`ProxyTarget::handle_event`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// A `size` record updated the layout; nothing was dispatched.
    Layout,
    /// The record was dispatched to this many listeners.
    Dispatched(usize),
}

/// Worker-side proxy for one host canvas.
#[derive(Default)]
pub struct ProxyTarget {
    left: Cell<f64>,
    top: Cell<f64>,
    width: Cell<f64>,
    height: Cell<f64>,
    listeners: RefCell<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_listener: Cell<u64>,
    focused: Cell<bool>,
    captured: RefCell<HashSet<i32>>,
    connected: Cell<bool>,
}

impl ProxyTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// The target doubles as its own owner document.
    pub fn owner_document(&self) -> &Self {
        self
    }

    /// The target doubles as its document's body.
    pub fn body(&self) -> &Self {
        self
    }

    /// Set the initial size reported before the first `size` record arrives.
    pub fn set_size(&self, width: f64, height: f64) {
        self.width.set(width);
        self.height.set(height);
    }

    /// Apply a forwarded record.
    ///
    /// `size` records only sync layout; a missing layout field keeps its
    /// previous value. Anything else is dispatched to listeners.
    pub fn handle_event(&self, record: EventRecord) -> Handled {
        if record.is_size() {
            let fields = [
                (&self.left, record.left),
                (&self.top, record.top),
                (&self.width, record.width),
                (&self.height, record.height),
            ];
            for (cell, value) in fields {
                if let Some(value) = value {
                    cell.set(value);
                }
            }
            log::trace!("Proxy layout synced to {:?}", self.bounding_client_rect());
            return Handled::Layout;
        }

        Handled::Dispatched(self.dispatch_event(&DispatchedEvent::from(record)))
    }

    /// Register a listener from a closure.
    pub fn on<F>(&self, kind: &str, listener: F) -> ListenerId
    where
        F: Fn(&DispatchedEvent) + 'static,
    {
        self.add_event_listener(kind, Rc::new(listener))
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.listeners.borrow().get(kind).map_or(0, Vec::len)
    }

    /// Convert host client coordinates into surface-local ones.
    pub fn local_point(&self, client_x: f64, client_y: f64) -> (f64, f64) {
        (client_x - self.left.get(), client_y - self.top.get())
    }

    pub fn has_focus(&self) -> bool {
        self.focused.get()
    }

    pub fn has_pointer_capture(&self, pointer_id: i32) -> bool {
        self.captured.borrow().contains(&pointer_id)
    }

    /// Mark the target as the event source of a created render root.
    pub(crate) fn connect(&self) {
        self.connected.set(true);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }
}

impl LayoutSource for ProxyTarget {
    fn client_width(&self) -> f64 {
        self.width.get()
    }

    fn client_height(&self) -> f64 {
        self.height.get()
    }

    fn bounding_client_rect(&self) -> ClientRect {
        ClientRect::new(
            self.left.get(),
            self.top.get(),
            self.width.get(),
            self.height.get(),
        )
    }
}

impl EventTarget for ProxyTarget {
    fn add_event_listener(&self, kind: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .entry(kind.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    fn remove_event_listener(&self, kind: &str, id: ListenerId) {
        if let Some(listeners) = self.listeners.borrow_mut().get_mut(kind) {
            listeners.retain(|(existing, _)| *existing != id);
        }
    }

    fn dispatch_event(&self, event: &DispatchedEvent) -> usize {
        // Snapshot so listeners may add or remove listeners while running.
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .get(event.kind())
            .map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    fn focus(&self) {
        self.focused.set(true);
    }

    fn set_pointer_capture(&self, pointer_id: i32) {
        self.captured.borrow_mut().insert(pointer_id);
    }

    fn release_pointer_capture(&self, pointer_id: i32) {
        self.captured.borrow_mut().remove(&pointer_id);
    }
}
