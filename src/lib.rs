pub mod controller;
pub mod event;
pub mod host;
pub mod props;
pub mod protocol;
pub mod reactive;
pub mod registry;
pub mod root;
pub mod scene;
pub mod target;
pub mod texture;
pub mod worker;

pub mod prelude {
    pub use crate::controller::Controller;
    pub use crate::event::{DispatchedEvent, EventRecord, Modifiers, PointerButtons};
    pub use crate::host::{HostBridge, SurfaceInfo};
    pub use crate::props::{Color, PropsError, PropsRecord};
    pub use crate::protocol::{CanvasId, HostMessage, ProtocolError, SurfaceHandle, WorkerMessage};
    pub use crate::scene::{BuildGate, BuiltScene, PropsUpdater, SceneBuilder, SceneContext};
    pub use crate::target::{ClientRect, EventTarget, LayoutSource, ProxyTarget};
    pub use crate::texture::{Bitmap, TextureCache, TextureError, TextureState};
    pub use crate::worker::{spawn_worker, Worker, WorkerConfig, WorkerError, WorkerHandle};
}
