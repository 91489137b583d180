//! Worker-side dispatch of host messages.
//!
//! The [`Controller`] owns every piece of worker state: the proxy targets,
//! the props store, the texture cache and one [`RenderRoot`] per live
//! canvas. Each id moves `Unborn -> Live -> Destroyed`; a destroyed id is
//! only brought back by a fresh `init`, which allocates a new target and
//! root.

use std::collections::HashMap;
use std::rc::Rc;

use tokio::sync::mpsc;

use crate::event::EventRecord;
use crate::props::PropsRecord;
use crate::protocol::{CanvasId, HostMessage, ProtocolError, WorkerMessage};
use crate::reactive::{PropertyStore, StoreKey};
use crate::registry::ProxyManager;
use crate::root::{MountContext, RenderRoot, RootConfig};
use crate::scene::SceneBuilder;
use crate::target::{Handled, ProxyTarget};
use crate::texture::{Bitmap, TextureCache};

pub struct Controller<B: SceneBuilder> {
    builder: Rc<B>,
    targets: ProxyManager,
    store: PropertyStore,
    textures: TextureCache,
    roots: HashMap<CanvasId, RenderRoot<B>>,
    outbound: mpsc::UnboundedSender<WorkerMessage>,
}

impl<B: SceneBuilder> Controller<B> {
    pub fn new(builder: B, outbound: mpsc::UnboundedSender<WorkerMessage>) -> Self {
        Self {
            builder: Rc::new(builder),
            targets: ProxyManager::new(),
            store: PropertyStore::new(),
            textures: TextureCache::new(),
            roots: HashMap::new(),
            outbound,
        }
    }

    /// Handle one host message.
    ///
    /// Must run inside a tokio `LocalSet`: mounting a root spawns local
    /// tasks.
    pub fn handle(&mut self, message: HostMessage) {
        log::debug!("Handling {} message", message.kind());
        match message {
            HostMessage::Init {
                canvas_id,
                canvas,
                width,
                height,
                pixel_ratio,
                props,
            } => {
                let config = RootConfig {
                    surface: canvas,
                    width,
                    height,
                    pixel_ratio,
                };
                self.init(canvas_id, config, props);
            }
            HostMessage::UpdateProps { canvas_id, props } => self.update_props(&canvas_id, props),
            HostMessage::Interaction { canvas_id, event } => self.interaction(&canvas_id, event),
            HostMessage::UpdateTexture { url, texture } => self.update_texture(&url, texture),
            HostMessage::Destroy { canvas_id } => self.destroy(&canvas_id),
        }
    }

    /// Decode and handle one JSON-encoded host message.
    pub fn handle_json(&mut self, json: &str) -> Result<(), ProtocolError> {
        let message = HostMessage::from_json(json)?;
        self.handle(message);
        Ok(())
    }

    fn init(&mut self, canvas_id: CanvasId, config: RootConfig, props: PropsRecord) {
        if let Err(err) = props.validate() {
            log::warn!("Props for {canvas_id} look off, storing them anyway: {err}");
        }
        if self.roots.contains_key(&canvas_id) {
            log::warn!("Canvas {canvas_id} initialised twice, destroying the live instance first");
            self.destroy(&canvas_id);
        }

        let target = self.targets.create_target(&canvas_id);
        target.set_size(f64::from(config.width), f64::from(config.height));
        self.store.set(&StoreKey::props(canvas_id.clone()), props);

        let root = RenderRoot::mount(
            canvas_id.clone(),
            config,
            target,
            MountContext {
                builder: &self.builder,
                store: &self.store,
                textures: &self.textures,
                outbound: &self.outbound,
            },
        );
        self.roots.insert(canvas_id, root);
    }

    fn update_props(&mut self, canvas_id: &CanvasId, props: PropsRecord) {
        if !self.is_live(canvas_id) {
            log::debug!("Ignoring updateProps for unknown canvas {canvas_id}");
            return;
        }
        if let Err(err) = props.validate() {
            log::warn!("Props for {canvas_id} look off, storing them anyway: {err}");
        }
        self.store.set(&StoreKey::props(canvas_id.clone()), props);
    }

    fn interaction(&mut self, canvas_id: &CanvasId, event: EventRecord) {
        match self.targets.route(canvas_id, event) {
            Some(Handled::Layout) => log::debug!("Updated layout of {canvas_id}"),
            Some(Handled::Dispatched(listeners)) => {
                log::trace!("Dispatched event on {canvas_id} to {listeners} listeners")
            }
            None => {}
        }
    }

    fn update_texture(&mut self, url: &str, texture: Bitmap) {
        log::debug!(
            "Texture {url} arrived ({}x{})",
            texture.width(),
            texture.height()
        );
        self.textures.ingest(url, texture);
    }

    fn destroy(&mut self, canvas_id: &CanvasId) {
        let Some(root) = self.roots.remove(canvas_id) else {
            log::debug!("Ignoring destroy for unknown canvas {canvas_id}");
            return;
        };
        root.unmount();
        self.targets.remove(canvas_id);
        self.store.remove(&StoreKey::props(canvas_id.clone()));
        log::info!("Destroyed canvas {canvas_id}");
    }

    /// Advance one frame on every created root.
    pub fn tick_frames(&self) {
        for root in self.roots.values() {
            root.frame();
        }
    }

    pub fn is_live(&self, canvas_id: &CanvasId) -> bool {
        self.roots.contains_key(canvas_id)
    }

    /// True once the canvas reported first-frame setup.
    pub fn is_created(&self, canvas_id: &CanvasId) -> bool {
        self.roots
            .get(canvas_id)
            .is_some_and(|root| root.is_created())
    }

    pub fn live_count(&self) -> usize {
        self.roots.len()
    }

    pub fn props(&self, canvas_id: &CanvasId) -> Option<PropsRecord> {
        self.store.read(&StoreKey::props(canvas_id.clone()))
    }

    pub fn target(&self, canvas_id: &CanvasId) -> Option<Rc<ProxyTarget>> {
        self.targets.lookup(canvas_id)
    }

    pub fn root(&self, canvas_id: &CanvasId) -> Option<&RenderRoot<B>> {
        self.roots.get(canvas_id)
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }
}

impl<B: SceneBuilder> Drop for Controller<B> {
    fn drop(&mut self) {
        // Unmount roots before the store and targets they observe go away.
        self.roots.clear();
    }
}
