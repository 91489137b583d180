//! Message contract between the host thread and the worker.
//!
//! Every message is tagged by a `type` field. Host to worker: `init`,
//! `updateProps`, `interaction`, `updateTexture`, `destroy`. Worker to host:
//! `setCanvasReady`. Messages for one canvas are processed in send order;
//! the protocol has no acknowledgements or resends.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::EventRecord;
use crate::props::PropsRecord;
use crate::texture::Bitmap;

/// Opaque key identifying one logical canvas across both contexts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanvasId(String);

impl CanvasId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CanvasId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CanvasId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for CanvasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a drawing surface whose ownership was transferred to the
/// worker. The worker passes it through to the scene builder untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceHandle(pub u64);

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Messages posted by the host to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// First message for a canvas: mount a scene on the transferred surface.
    #[serde(rename_all = "camelCase")]
    Init {
        canvas_id: CanvasId,
        canvas: SurfaceHandle,
        width: u32,
        height: u32,
        pixel_ratio: f64,
        props: PropsRecord,
    },
    /// Replace the whole props record of a live canvas.
    #[serde(rename_all = "camelCase")]
    UpdateProps {
        canvas_id: CanvasId,
        props: PropsRecord,
    },
    /// Forwarded input or layout record.
    #[serde(rename_all = "camelCase")]
    Interaction {
        canvas_id: CanvasId,
        event: EventRecord,
    },
    /// A decoded bitmap; not scoped to a canvas.
    #[serde(rename_all = "camelCase")]
    UpdateTexture { url: String, texture: Bitmap },
    /// Tear down a canvas. Unknown ids are ignored.
    #[serde(rename_all = "camelCase")]
    Destroy { canvas_id: CanvasId },
}

impl HostMessage {
    pub fn canvas_id(&self) -> Option<&CanvasId> {
        match self {
            HostMessage::Init { canvas_id, .. }
            | HostMessage::UpdateProps { canvas_id, .. }
            | HostMessage::Interaction { canvas_id, .. }
            | HostMessage::Destroy { canvas_id } => Some(canvas_id),
            HostMessage::UpdateTexture { .. } => None,
        }
    }

    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            HostMessage::Init { .. } => "init",
            HostMessage::UpdateProps { .. } => "updateProps",
            HostMessage::Interaction { .. } => "interaction",
            HostMessage::UpdateTexture { .. } => "updateTexture",
            HostMessage::Destroy { .. } => "destroy",
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages posted by the worker to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerMessage {
    /// The canvas finished first-frame setup and is interactive.
    #[serde(rename_all = "camelCase")]
    SetCanvasReady { canvas_id: CanvasId, value: bool },
}

impl WorkerMessage {
    pub fn canvas_ready(canvas_id: CanvasId) -> Self {
        WorkerMessage::SetCanvasReady {
            canvas_id,
            value: true,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
