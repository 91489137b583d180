//! Serializable input records forwarded from the host.
//!
//! The host strips native UI events down to an [`EventRecord`] before posting
//! them to the worker. A record whose type is `"size"` carries layout fields
//! instead of input data and is never dispatched to listeners.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Record type used for pure layout syncs.
pub const SIZE_EVENT: &str = "size";

bitflags! {
    /// Keyboard modifier state captured with an input record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const CTRL = 0b0001;
        const SHIFT = 0b0010;
        const ALT = 0b0100;
        const META = 0b1000;
    }
}

bitflags! {
    /// Pressed pointer buttons, using the DOM `buttons` bit layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PointerButtons: u16 {
        const PRIMARY = 1;
        const SECONDARY = 1 << 1;
        const AUXILIARY = 1 << 2;
        const BACK = 1 << 3;
        const FORWARD = 1 << 4;
    }
}

/// A plain record mirroring the subset of a UI event the renderer reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_y: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_mode: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default)]
    pub ctrl_key: bool,
    #[serde(default)]
    pub shift_key: bool,
    #[serde(default)]
    pub alt_key: bool,
    #[serde(default)]
    pub meta_key: bool,

    // Layout fields, only meaningful for `size` records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl EventRecord {
    /// An input record of the given type with no payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// A layout sync record.
    pub fn size(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            kind: SIZE_EVENT.to_string(),
            left: Some(left),
            top: Some(top),
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    /// A pointer record at client coordinates.
    pub fn pointer(kind: impl Into<String>, client_x: f64, client_y: f64) -> Self {
        Self {
            kind: kind.into(),
            client_x: Some(client_x),
            client_y: Some(client_y),
            pointer_type: Some("mouse".to_string()),
            ..Default::default()
        }
    }

    pub fn with_buttons(mut self, buttons: PointerButtons) -> Self {
        self.buttons = Some(buttons.bits());
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.ctrl_key = modifiers.contains(Modifiers::CTRL);
        self.shift_key = modifiers.contains(Modifiers::SHIFT);
        self.alt_key = modifiers.contains(Modifiers::ALT);
        self.meta_key = modifiers.contains(Modifiers::META);
        self
    }

    pub fn is_size(&self) -> bool {
        self.kind == SIZE_EVENT
    }

    pub fn modifiers(&self) -> Modifiers {
        let mut mods = Modifiers::empty();
        mods.set(Modifiers::CTRL, self.ctrl_key);
        mods.set(Modifiers::SHIFT, self.shift_key);
        mods.set(Modifiers::ALT, self.alt_key);
        mods.set(Modifiers::META, self.meta_key);
        mods
    }

    /// Unknown bits are dropped.
    pub fn buttons(&self) -> PointerButtons {
        PointerButtons::from_bits_truncate(self.buttons.unwrap_or(0))
    }

    pub fn coords(&self) -> Option<(f64, f64)> {
        Some((self.client_x?, self.client_y?))
    }
}

/// An [`EventRecord`] as observed by listeners on a proxy target.
///
/// There is no native event behind it, so `prevent_default` and
/// `stop_propagation` do nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub record: EventRecord,
}

impl DispatchedEvent {
    pub fn kind(&self) -> &str {
        &self.record.kind
    }

    pub fn prevent_default(&self) {}

    pub fn stop_propagation(&self) {}
}

impl From<EventRecord> for DispatchedEvent {
    fn from(record: EventRecord) -> Self {
        Self { record }
    }
}
