//! Registry of proxy targets keyed by canvas id.

use std::collections::HashMap;
use std::rc::Rc;

use crate::event::EventRecord;
use crate::protocol::CanvasId;
use crate::target::{Handled, ProxyTarget};

/// Maps each live canvas to its [`ProxyTarget`].
#[derive(Default)]
pub struct ProxyManager {
    targets: HashMap<CanvasId, Rc<ProxyTarget>>,
}

impl ProxyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh target for `id`, replacing any existing one.
    pub fn create_target(&mut self, id: &CanvasId) -> Rc<ProxyTarget> {
        let target = Rc::new(ProxyTarget::new());
        if self.targets.insert(id.clone(), target.clone()).is_some() {
            log::warn!("Replaced live proxy target for {id}");
        }
        target
    }

    pub fn lookup(&self, id: &CanvasId) -> Option<Rc<ProxyTarget>> {
        self.targets.get(id).cloned()
    }

    /// Look up a target that must exist because `init` created it.
    ///
    /// # Panics
    ///
    /// Panics if no target is registered for `id`.
    pub fn expect_target(&self, id: &CanvasId) -> Rc<ProxyTarget> {
        self.lookup(id).unwrap_or_else(|| {
            panic!("Proxy target for {id} should exist, it is created during init")
        })
    }

    /// Forward a record to the target for `id`. Records for unknown ids are
    /// dropped, since the host may already have destroyed the instance.
    pub fn route(&self, id: &CanvasId, record: EventRecord) -> Option<Handled> {
        match self.targets.get(id) {
            Some(target) => Some(target.handle_event(record)),
            None => {
                log::debug!("Dropping {} event for unknown canvas {id}", record.kind);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &CanvasId) -> Option<Rc<ProxyTarget>> {
        self.targets.remove(id)
    }

    pub fn contains(&self, id: &CanvasId) -> bool {
        self.targets.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &CanvasId> + '_ {
        self.targets.keys()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::LayoutSource;

    #[test]
    fn test_create_and_lookup() {
        let mut manager = ProxyManager::new();
        let id = CanvasId::from("c1");
        let target = manager.create_target(&id);
        assert!(Rc::ptr_eq(&target, &manager.expect_target(&id)));
        assert!(manager.lookup(&CanvasId::from("c2")).is_none());
    }

    #[test]
    fn test_second_create_replaces_first() {
        let mut manager = ProxyManager::new();
        let id = CanvasId::from("c1");
        let first = manager.create_target(&id);
        let second = manager.create_target(&id);
        assert!(!Rc::ptr_eq(&first, &second));
        assert!(Rc::ptr_eq(&second, &manager.expect_target(&id)));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_route_to_known_target() {
        let mut manager = ProxyManager::new();
        let id = CanvasId::from("c1");
        let target = manager.create_target(&id);

        let handled = manager.route(&id, EventRecord::size(1.0, 2.0, 3.0, 4.0));
        assert_eq!(handled, Some(Handled::Layout));
        assert_eq!(target.client_width(), 3.0);
    }

    #[test]
    fn test_route_to_unknown_target_is_dropped() {
        let manager = ProxyManager::new();
        let handled = manager.route(&CanvasId::from("gone"), EventRecord::new("pointerdown"));
        assert_eq!(handled, None);
    }

    #[test]
    fn test_remove_then_route_is_noop() {
        let mut manager = ProxyManager::new();
        let id = CanvasId::from("c1");
        manager.create_target(&id);
        assert!(manager.remove(&id).is_some());
        assert!(manager.remove(&id).is_none());
        assert!(manager.is_empty());
        assert_eq!(manager.route(&id, EventRecord::new("pointerdown")), None);
    }

    #[test]
    #[should_panic(expected = "should exist")]
    fn test_expect_target_panics_when_missing() {
        ProxyManager::new().expect_target(&CanvasId::from("missing"));
    }
}
