//! Host-side end of the protocol.
//!
//! The [`HostBridge`] lives next to the real surface. It names canvases,
//! strips input down to the records the worker understands, decodes images
//! before they cross over and remembers which canvases reported ready.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::event::{EventRecord, SIZE_EVENT};
use crate::props::PropsRecord;
use crate::protocol::{CanvasId, HostMessage, SurfaceHandle, WorkerMessage};
use crate::texture::Bitmap;
use crate::worker::WorkerError;

/// Input event types forwarded to the worker. Everything else stays on the
/// host.
pub const FORWARDED_EVENTS: &[&str] = &[
    "pointerdown",
    "pointermove",
    "pointerup",
    "pointercancel",
    "pointerleave",
    "wheel",
    "contextmenu",
    "keydown",
    "keyup",
];

/// A fresh id, unique within the process.
pub fn next_canvas_id() -> CanvasId {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    CanvasId::new(format!("canvas-{}", COUNTER.fetch_add(1, Ordering::Relaxed)))
}

pub fn is_forwarded(kind: &str) -> bool {
    kind == SIZE_EVENT || FORWARDED_EVENTS.contains(&kind)
}

/// Surface description passed to [`HostBridge::mount`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceInfo {
    pub handle: SurfaceHandle,
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f64,
}

pub struct HostBridge {
    sender: mpsc::UnboundedSender<HostMessage>,
    ready: HashMap<CanvasId, bool>,
}

impl HostBridge {
    pub fn new(sender: mpsc::UnboundedSender<HostMessage>) -> Self {
        Self {
            sender,
            ready: HashMap::new(),
        }
    }

    fn post(&self, message: HostMessage) -> Result<(), WorkerError> {
        self.sender
            .send(message)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Hand a surface to the worker under a freshly allocated id.
    pub fn mount(&mut self, surface: SurfaceInfo, props: PropsRecord) -> Result<CanvasId, WorkerError> {
        let canvas_id = next_canvas_id();
        self.post(HostMessage::Init {
            canvas_id: canvas_id.clone(),
            canvas: surface.handle,
            width: surface.width,
            height: surface.height,
            pixel_ratio: surface.pixel_ratio,
            props,
        })?;
        self.ready.insert(canvas_id.clone(), false);
        log::debug!("Mounted {canvas_id} on surface {:?}", surface.handle);
        Ok(canvas_id)
    }

    pub fn update_props(&self, canvas_id: &CanvasId, props: PropsRecord) -> Result<(), WorkerError> {
        self.post(HostMessage::UpdateProps {
            canvas_id: canvas_id.clone(),
            props,
        })
    }

    /// Forward an input record. Returns `false` when the event type is not
    /// forwarded and nothing was sent.
    pub fn forward_event(&self, canvas_id: &CanvasId, event: EventRecord) -> Result<bool, WorkerError> {
        if !is_forwarded(&event.kind) {
            log::trace!("Not forwarding {} to {canvas_id}", event.kind);
            return Ok(false);
        }
        self.post(HostMessage::Interaction {
            canvas_id: canvas_id.clone(),
            event,
        })?;
        Ok(true)
    }

    /// Sync the surface's layout rect into the worker.
    pub fn resize(
        &self,
        canvas_id: &CanvasId,
        left: f64,
        top: f64,
        width: f64,
        height: f64,
    ) -> Result<(), WorkerError> {
        self.post(HostMessage::Interaction {
            canvas_id: canvas_id.clone(),
            event: EventRecord::size(left, top, width, height),
        })
    }

    /// Decode fetched image bytes and push the bitmap for `url`.
    pub fn push_texture(&self, url: &str, bytes: &[u8]) -> Result<(), WorkerError> {
        let bitmap = Bitmap::decode(bytes)?;
        self.push_bitmap(url, bitmap)
    }

    pub fn push_bitmap(&self, url: &str, texture: Bitmap) -> Result<(), WorkerError> {
        log::debug!(
            "Pushing texture {url} ({}x{})",
            texture.width(),
            texture.height()
        );
        self.post(HostMessage::UpdateTexture {
            url: url.to_string(),
            texture,
        })
    }

    pub fn destroy(&mut self, canvas_id: &CanvasId) -> Result<(), WorkerError> {
        self.post(HostMessage::Destroy {
            canvas_id: canvas_id.clone(),
        })?;
        self.ready.remove(canvas_id);
        Ok(())
    }

    /// Apply a message from the worker.
    pub fn handle_worker_message(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::SetCanvasReady { canvas_id, value } => {
                match self.ready.get_mut(&canvas_id) {
                    Some(ready) => {
                        *ready = value;
                        log::info!("Canvas {canvas_id} ready: {value}");
                    }
                    None => log::debug!("Ready report for unmounted canvas {canvas_id}"),
                }
            }
        }
    }

    pub fn is_mounted(&self, canvas_id: &CanvasId) -> bool {
        self.ready.contains_key(canvas_id)
    }

    pub fn is_ready(&self, canvas_id: &CanvasId) -> bool {
        self.ready.get(canvas_id).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, RgbaImage};

    fn bridge() -> (HostBridge, mpsc::UnboundedReceiver<HostMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HostBridge::new(tx), rx)
    }

    fn surface() -> SurfaceInfo {
        SurfaceInfo {
            handle: SurfaceHandle(3),
            width: 300,
            height: 150,
            pixel_ratio: 2.0,
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let a = next_canvas_id();
        let b = next_canvas_id();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("canvas-"));
    }

    #[test]
    fn test_mount_sends_init() {
        let (mut bridge, mut rx) = bridge();
        let id = bridge.mount(surface(), PropsRecord::new().color("#fff")).unwrap();

        match rx.try_recv().unwrap() {
            HostMessage::Init {
                canvas_id,
                canvas,
                pixel_ratio,
                props,
                ..
            } => {
                assert_eq!(canvas_id, id);
                assert_eq!(canvas, SurfaceHandle(3));
                assert_eq!(pixel_ratio, 2.0);
                assert_eq!(props.color.as_deref(), Some("#fff"));
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert!(bridge.is_mounted(&id));
        assert!(!bridge.is_ready(&id));
    }

    #[test]
    fn test_only_whitelisted_events_are_forwarded() {
        let (bridge, mut rx) = bridge();
        let id = CanvasId::from("c1");

        assert!(bridge
            .forward_event(&id, EventRecord::pointer("pointerdown", 4.0, 5.0))
            .unwrap());
        assert!(!bridge
            .forward_event(&id, EventRecord::pointer("mouseover", 4.0, 5.0))
            .unwrap());
        assert!(!bridge.forward_event(&id, EventRecord::new("focus")).unwrap());

        assert!(matches!(
            rx.try_recv().unwrap(),
            HostMessage::Interaction { event, .. } if event.kind == "pointerdown"
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_resize_sends_size_record() {
        let (bridge, mut rx) = bridge();
        bridge
            .resize(&CanvasId::from("c1"), 0.0, 0.0, 300.0, 150.0)
            .unwrap();
        match rx.try_recv().unwrap() {
            HostMessage::Interaction { event, .. } => {
                assert!(event.is_size());
                assert_eq!(event.height, Some(150.0));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_push_texture_decodes_png() {
        let (bridge, mut rx) = bridge();
        let image = RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        bridge.push_texture("tex1", &bytes).unwrap();
        match rx.try_recv().unwrap() {
            HostMessage::UpdateTexture { url, texture } => {
                assert_eq!(url, "tex1");
                assert_eq!((texture.width(), texture.height()), (2, 3));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_push_texture_rejects_garbage() {
        let (bridge, mut rx) = bridge();
        let err = bridge.push_texture("tex1", b"definitely not an image").unwrap_err();
        assert!(matches!(err, WorkerError::Texture(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ready_tracking() {
        let (mut bridge, _rx) = bridge();
        let id = bridge.mount(surface(), PropsRecord::new()).unwrap();

        bridge.handle_worker_message(WorkerMessage::canvas_ready(id.clone()));
        assert!(bridge.is_ready(&id));

        bridge.destroy(&id).unwrap();
        assert!(!bridge.is_mounted(&id));
        // A late report for a destroyed canvas is ignored.
        bridge.handle_worker_message(WorkerMessage::canvas_ready(id.clone()));
        assert!(!bridge.is_ready(&id));
    }

    #[test]
    fn test_closed_channel_is_reported() {
        let (mut bridge, rx) = bridge();
        drop(rx);
        assert!(matches!(
            bridge.mount(surface(), PropsRecord::new()),
            Err(WorkerError::ChannelClosed)
        ));
    }

    #[test]
    fn test_failed_destroy_keeps_canvas_known() {
        let (mut bridge, rx) = bridge();
        let id = bridge.mount(surface(), PropsRecord::new()).unwrap();
        drop(rx);

        assert!(matches!(
            bridge.destroy(&id),
            Err(WorkerError::ChannelClosed)
        ));
        assert!(bridge.is_mounted(&id));
    }
}
