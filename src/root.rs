//! A mounted scene bound to one canvas.
//!
//! A [`RenderRoot`] is mounted once per `init`. It reads the canvas' props
//! from the [`PropertyStore`], builds the scene, and then only follows store
//! updates: later `updateProps` messages are fed to the scene's
//! [`PropsUpdater`](crate::scene::PropsUpdater) one at a time, in order.
//! Once the scene reports first-frame setup the root connects the proxy
//! target and tells the host the canvas is ready.

use std::cell::Cell;
use std::rc::Rc;

use tokio::sync::mpsc;

use crate::props::PropsRecord;
use crate::protocol::{CanvasId, SurfaceHandle, WorkerMessage};
use crate::reactive::{Owner, PropertyStore, StoreKey};
use crate::scene::{BuiltScene, SceneBuilder, SceneContext};
use crate::target::ProxyTarget;
use crate::texture::TextureCache;

/// Surface parameters taken from the `init` message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootConfig {
    pub surface: SurfaceHandle,
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f64,
}

/// Shared state a root needs from its controller.
pub struct MountContext<'a, B> {
    pub builder: &'a Rc<B>,
    pub store: &'a PropertyStore,
    pub textures: &'a TextureCache,
    pub outbound: &'a mpsc::UnboundedSender<WorkerMessage>,
}

pub struct RenderRoot<B: SceneBuilder> {
    canvas_id: CanvasId,
    config: RootConfig,
    builder: Rc<B>,
    scene: Rc<BuiltScene<B::Scene, B::Camera>>,
    created: Rc<Cell<bool>>,
    owner: Owner,
}

impl<B: SceneBuilder> RenderRoot<B> {
    /// Mount a scene for `canvas_id`.
    ///
    /// # Panics
    ///
    /// Panics if no props are stored for `canvas_id` (the controller must
    /// populate the store first), or if called outside a tokio `LocalSet`.
    pub fn mount(
        canvas_id: CanvasId,
        config: RootConfig,
        target: Rc<ProxyTarget>,
        cx: MountContext<'_, B>,
    ) -> Self {
        let owner = Owner::new();
        let key = StoreKey::props(canvas_id.clone());

        let props = cx.store.read::<PropsRecord>(&key).unwrap_or_else(|| {
            panic!("Props for {canvas_id} should be set before rendering")
        });

        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel::<PropsRecord>();
        let (_, subscription) = cx
            .store
            .use_read(&key, props.clone(), move |props: &PropsRecord| {
                let _ = updates_tx.send(props.clone());
            });
        owner.retain(subscription);

        log::info!(
            "Mounting root for {canvas_id}: {}x{} @ {}x",
            config.width,
            config.height,
            config.pixel_ratio
        );
        let scene = Rc::new(cx.builder.build(SceneContext {
            canvas_id: canvas_id.clone(),
            surface: config.surface,
            width: config.width,
            height: config.height,
            pixel_ratio: config.pixel_ratio,
            props,
            target: target.clone(),
            textures: cx.textures.clone(),
        }));

        // Updates are applied one at a time so the last `updateProps` wins.
        let updater = scene.updater.clone();
        let updates = tokio::task::spawn_local(async move {
            while let Some(props) = updates_rx.recv().await {
                updater.update_props(props).await;
            }
        });
        owner.on_cleanup(move || updates.abort());

        let created = Rc::new(Cell::new(false));
        let on_created = tokio::task::spawn_local({
            let canvas_id = canvas_id.clone();
            let builder = cx.builder.clone();
            let scene = scene.clone();
            let created = created.clone();
            let outbound = cx.outbound.clone();
            async move {
                scene.created.wait().await;
                target.connect();
                builder.connect_events(&scene, &target);
                created.set(true);
                log::info!("Canvas {canvas_id} created, reporting ready");
                if outbound
                    .send(WorkerMessage::canvas_ready(canvas_id.clone()))
                    .is_err()
                {
                    log::warn!("Host channel closed before {canvas_id} became ready");
                }
            }
        });
        owner.on_cleanup(move || on_created.abort());

        Self {
            canvas_id,
            config,
            builder: cx.builder.clone(),
            scene,
            created,
            owner,
        }
    }

    pub fn canvas_id(&self) -> &CanvasId {
        &self.canvas_id
    }

    pub fn config(&self) -> RootConfig {
        self.config
    }

    pub fn scene(&self) -> &BuiltScene<B::Scene, B::Camera> {
        &self.scene
    }

    /// True once first-frame setup finished and the host was told.
    pub fn is_created(&self) -> bool {
        self.created.get()
    }

    pub fn is_mounted(&self) -> bool {
        !self.owner.is_disposed()
    }

    /// Advance one frame if the root is created.
    pub fn frame(&self) {
        if self.is_created() && self.is_mounted() {
            self.builder.frame(&self.scene);
        }
    }

    /// Stop following the store, cancel pending setup and release the
    /// scene. Calling it again does nothing.
    pub fn unmount(&self) {
        if self.owner.is_disposed() {
            return;
        }
        self.owner.dispose();
        self.builder.dispose(&self.scene);
        log::info!("Unmounted root for {}", self.canvas_id);
    }
}

impl<B: SceneBuilder> Drop for RenderRoot<B> {
    fn drop(&mut self) {
        self.unmount();
    }
}
