//! Contract with the external scene builder.
//!
//! The worker does not author meshes, materials, cameras or lighting. It
//! hands a validated [`PropsRecord`] and the canvas' [`ProxyTarget`] to a
//! [`SceneBuilder`] and gets back a [`BuiltScene`]: the scene, its camera and
//! a [`PropsUpdater`] used to apply later props without rebuilding.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use tokio::sync::Notify;

use crate::props::PropsRecord;
use crate::protocol::{CanvasId, SurfaceHandle};
use crate::target::ProxyTarget;
use crate::texture::TextureCache;

pub type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// A one-shot barrier: closed until [`BuildGate::open`], open forever after.
///
/// Clones share the same gate.
#[derive(Clone, Default)]
pub struct BuildGate {
    inner: Rc<GateInner>,
}

#[derive(Default)]
struct GateInner {
    open: Cell<bool>,
    notify: Notify,
}

impl BuildGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gate that is already open, for builders with no asynchronous setup.
    pub fn opened() -> Self {
        let gate = Self::new();
        gate.open();
        gate
    }

    pub fn open(&self) {
        if !self.inner.open.replace(true) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.get()
    }

    pub async fn wait(&self) {
        loop {
            // Created before the check so an `open` in between still wakes us.
            let notified = self.inner.notify.notified();
            if self.is_open() {
                return;
            }
            notified.await;
        }
    }
}

/// Applies props to a built scene once its first build has finished.
///
/// Safe to call any number of times; every call awaits the first build, so
/// an update never races the initial construction.
#[derive(Clone)]
pub struct PropsUpdater {
    first_build: BuildGate,
    apply: Rc<dyn Fn(PropsRecord)>,
}

impl PropsUpdater {
    pub fn new<F>(first_build: BuildGate, apply: F) -> Self
    where
        F: Fn(PropsRecord) + 'static,
    {
        Self {
            first_build,
            apply: Rc::new(apply),
        }
    }

    pub fn update_props(&self, props: PropsRecord) -> LocalBoxFuture<()> {
        let gate = self.first_build.clone();
        let apply = self.apply.clone();
        Box::pin(async move {
            gate.wait().await;
            apply(props);
        })
    }
}

/// Everything a builder gets for one canvas.
pub struct SceneContext {
    pub canvas_id: CanvasId,
    pub surface: SurfaceHandle,
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f64,
    pub props: PropsRecord,
    /// Element stand-in the interaction layer (camera controls, pointer
    /// hit testing) listens on.
    pub target: Rc<ProxyTarget>,
    pub textures: TextureCache,
}

/// What a builder hands back for one canvas.
pub struct BuiltScene<S, C> {
    pub scene: S,
    pub camera: C,
    pub updater: PropsUpdater,
    /// Opened once the underlying context finished first-frame setup.
    pub created: BuildGate,
}

/// The external scene builder.
pub trait SceneBuilder: 'static {
    type Scene: 'static;
    type Camera: 'static;

    fn build(&self, ctx: SceneContext) -> BuiltScene<Self::Scene, Self::Camera>;

    /// Called once the root is created and the proxy target has been
    /// connected as its event source.
    fn connect_events(&self, _scene: &BuiltScene<Self::Scene, Self::Camera>, _target: &Rc<ProxyTarget>) {}

    /// Advance one frame. Only called for created roots.
    fn frame(&self, _scene: &BuiltScene<Self::Scene, Self::Camera>) {}

    /// Release engine resources when the root is unmounted.
    fn dispose(&self, _scene: &BuiltScene<Self::Scene, Self::Camera>) {}
}
