//! Texture readiness cache for bitmaps decoded on the host.
//!
//! The worker cannot decode image assets itself, so decoded bitmaps arrive
//! asynchronously via `updateTexture` messages. Render code either polls
//! [`TextureCache::get`] or awaits a [`TextureFuture`] that resolves once the
//! bitmap for its url has been ingested.
//!
//! Subscribing with [`TextureCache::on_ready`] after a bitmap already arrived
//! does not fire the callback; callers must re-check [`TextureCache::get`]
//! after subscribing. [`TextureCache::resolve`] does this for you.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Error, Debug)]
pub enum TextureError {
    #[error("texture `{0}` failed permanently")]
    Failed(String),
    #[error("failed to decode texture: {0}")]
    Decode(#[from] image::ImageError),
}

/// A decoded RGBA8 image, cheap to clone and shareable across threads.
#[derive(Clone)]
pub struct Bitmap(Arc<RgbaImage>);

impl Bitmap {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    /// Wrap raw RGBA8 pixels. Returns `None` if the buffer length does not
    /// match `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, pixels).map(Self::new)
    }

    /// Decode an encoded image (PNG, JPEG, GIF, WebP) into a bitmap.
    pub fn decode(bytes: &[u8]) -> Result<Self, TextureError> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self::new(image.to_rgba8()))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height() == 0 {
            return 1.0;
        }
        self.width() as f32 / self.height() as f32
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    /// True if both handles point at the same decoded image.
    pub fn ptr_eq(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct RawBitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Serialize for Bitmap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawBitmap {
            width: self.width(),
            height: self.height(),
            pixels: self.0.as_raw().clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Bitmap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawBitmap::deserialize(deserializer)?;
        Bitmap::from_rgba(raw.width, raw.height, raw.pixels).ok_or_else(|| {
            serde::de::Error::custom("bitmap pixel buffer does not match its dimensions")
        })
    }
}

/// Observable state of one url in the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureState {
    Absent,
    Pending,
    Ready(Bitmap),
    Failed,
}

#[derive(Debug, Clone)]
enum TextureEntry {
    Pending,
    Ready(Bitmap),
    Failed,
}

/// Handle returned by [`TextureCache::on_ready`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

#[derive(Clone, Copy)]
enum Arrival<'a> {
    Ready(&'a Bitmap),
    Failed,
}

type Subscriber = Rc<dyn Fn(Arrival<'_>)>;

fn subscriber<F>(f: F) -> Subscriber
where
    F: Fn(Arrival<'_>) + 'static,
{
    Rc::new(f)
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, TextureEntry>,
    subscribers: HashMap<String, Vec<(CallbackId, Subscriber)>>,
    next_callback: u64,
}

/// Keyed cache of host-decoded bitmaps plus per-url subscriber lists.
///
/// Cloning yields another handle to the same cache.
#[derive(Clone, Default)]
pub struct TextureCache {
    inner: Rc<RefCell<CacheInner>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bitmap for `url` if it is ready. Never suspends.
    pub fn get(&self, url: &str) -> Option<Bitmap> {
        match self.inner.borrow().entries.get(url) {
            Some(TextureEntry::Ready(bitmap)) => Some(bitmap.clone()),
            _ => None,
        }
    }

    pub fn state(&self, url: &str) -> TextureState {
        match self.inner.borrow().entries.get(url) {
            None => TextureState::Absent,
            Some(TextureEntry::Pending) => TextureState::Pending,
            Some(TextureEntry::Ready(bitmap)) => TextureState::Ready(bitmap.clone()),
            Some(TextureEntry::Failed) => TextureState::Failed,
        }
    }

    /// Record that the host has started producing `url`. Ignored once the
    /// url is ready.
    pub fn mark_pending(&self, url: &str) {
        let mut inner = self.inner.borrow_mut();
        if !matches!(inner.entries.get(url), Some(TextureEntry::Ready(_))) {
            inner.entries.insert(url.to_string(), TextureEntry::Pending);
        }
    }

    /// Record that `url` will never arrive. Pending resolutions for it
    /// complete with [`TextureError::Failed`]. Ignored once the url is ready.
    pub fn mark_failed(&self, url: &str) {
        {
            let mut inner = self.inner.borrow_mut();
            if matches!(inner.entries.get(url), Some(TextureEntry::Ready(_))) {
                return;
            }
            inner.entries.insert(url.to_string(), TextureEntry::Failed);
        }
        log::warn!("Texture {url} marked as failed");
        self.notify(url, Arrival::Failed);
    }

    /// Subscribe to arrivals of `url`. Does not fire for a bitmap that is
    /// already present.
    pub fn on_ready<F>(&self, url: &str, callback: F) -> CallbackId
    where
        F: Fn(&Bitmap) + 'static,
    {
        self.subscribe(
            url,
            subscriber(move |arrival| {
                if let Arrival::Ready(bitmap) = arrival {
                    callback(bitmap);
                }
            }),
        )
    }

    /// Remove a subscription by identity. Unknown ids are ignored.
    pub fn off_ready(&self, url: &str, id: CallbackId) {
        let mut inner = self.inner.borrow_mut();
        let now_empty = match inner.subscribers.get_mut(url) {
            Some(subscribers) => {
                subscribers.retain(|(existing, _)| *existing != id);
                subscribers.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.subscribers.remove(url);
        }
    }

    /// Number of callbacks currently subscribed to `url`.
    pub fn subscriber_count(&self, url: &str) -> usize {
        self.inner
            .borrow()
            .subscribers
            .get(url)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Store `bitmap` for `url` and invoke every subscriber registered at
    /// the time of the call, in subscription order. The subscriber list is
    /// left in place.
    pub fn ingest(&self, url: &str, bitmap: Bitmap) {
        self.inner
            .borrow_mut()
            .entries
            .insert(url.to_string(), TextureEntry::Ready(bitmap.clone()));
        log::debug!(
            "Ingested texture {url} ({}x{}), {} subscriber(s)",
            bitmap.width(),
            bitmap.height(),
            self.subscriber_count(url)
        );
        self.notify(url, Arrival::Ready(&bitmap));
    }

    /// Wait for `url` to become ready. With no url the future never
    /// completes; render an alternate branch instead of awaiting it.
    ///
    /// Dropping the future (for example because the owning root was
    /// unmounted) removes its subscription.
    pub fn resolve(&self, url: Option<&str>) -> TextureFuture {
        let cache = self.clone();
        let url = url.map(str::to_string);
        Box::pin(async move {
            let Some(url) = url else {
                return std::future::pending::<Result<Bitmap, TextureError>>().await;
            };

            let arrived = Rc::new(Notify::new());
            let signal = arrived.clone();
            let _subscription = Subscription {
                id: cache.subscribe(&url, subscriber(move |_| signal.notify_one())),
                cache: cache.clone(),
                url: url.clone(),
            };

            // Checked after subscribing so an arrival in between is not missed.
            loop {
                match cache.state(&url) {
                    TextureState::Ready(bitmap) => return Ok(bitmap),
                    TextureState::Failed => return Err(TextureError::Failed(url)),
                    TextureState::Absent | TextureState::Pending => arrived.notified().await,
                }
            }
        })
    }

    fn subscribe(&self, url: &str, subscriber: Subscriber) -> CallbackId {
        let mut inner = self.inner.borrow_mut();
        let id = CallbackId(inner.next_callback);
        inner.next_callback += 1;
        inner
            .subscribers
            .entry(url.to_string())
            .or_default()
            .push((id, subscriber));
        id
    }

    fn notify(&self, url: &str, arrival: Arrival<'_>) {
        let ids: Vec<CallbackId> = self
            .inner
            .borrow()
            .subscribers
            .get(url)
            .map(|subscribers| subscribers.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default();

        for id in ids {
            // Look the callback up again: an earlier callback may have removed it.
            let current = self.inner.borrow().subscribers.get(url).and_then(|subscribers| {
                subscribers
                    .iter()
                    .find(|(existing, _)| *existing == id)
                    .map(|(_, callback)| callback.clone())
            });
            if let Some(callback) = current {
                callback(arrival);
            }
        }
    }
}

/// Resolves to the bitmap for a url once it has been ingested.
pub type TextureFuture = Pin<Box<dyn Future<Output = Result<Bitmap, TextureError>>>>;

/// Removes a [`TextureCache::resolve`] subscription when dropped.
struct Subscription {
    cache: TextureCache,
    url: String,
    id: CallbackId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cache.off_ready(&self.url, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn bitmap(shade: u8) -> Bitmap {
        Bitmap::from_rgba(2, 1, vec![shade; 8]).unwrap()
    }

    #[test]
    fn test_get_before_and_after_ingest() {
        let cache = TextureCache::new();
        assert!(cache.get("tex1").is_none());
        assert_eq!(cache.state("tex1"), TextureState::Absent);

        let b = bitmap(7);
        cache.ingest("tex1", b.clone());
        assert!(cache.get("tex1").unwrap().ptr_eq(&b));
    }

    #[test]
    fn test_ingest_notifies_in_subscription_order() {
        let cache = TextureCache::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            cache.on_ready("tex1", move |_| order.borrow_mut().push(n));
        }
        cache.ingest("tex1", bitmap(1));
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        // List is kept for callers to clean up themselves.
        assert_eq!(cache.subscriber_count("tex1"), 3);
    }

    #[test]
    fn test_only_matching_url_is_notified() {
        let cache = TextureCache::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        cache.on_ready("a", move |_| h.set(h.get() + 1));
        cache.ingest("b", bitmap(1));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_self_unsubscribe_during_ingest() {
        let cache = TextureCache::new();
        let calls = Rc::new(Cell::new(0));
        let id_slot: Rc<Cell<Option<CallbackId>>> = Rc::new(Cell::new(None));

        let c = cache.clone();
        let calls_in = calls.clone();
        let slot = id_slot.clone();
        let id = cache.on_ready("tex1", move |_| {
            calls_in.set(calls_in.get() + 1);
            if let Some(id) = slot.get() {
                c.off_ready("tex1", id);
            }
        });
        id_slot.set(Some(id));

        let later = Rc::new(Cell::new(0));
        let l = later.clone();
        cache.on_ready("tex1", move |_| l.set(l.get() + 1));

        cache.ingest("tex1", bitmap(1));
        assert_eq!(calls.get(), 1);
        assert_eq!(later.get(), 1);
        assert_eq!(cache.subscriber_count("tex1"), 1);

        cache.ingest("tex1", bitmap(2));
        assert_eq!(calls.get(), 1);
        assert_eq!(later.get(), 2);
    }

    #[test]
    fn test_callback_removed_by_earlier_callback_is_skipped() {
        let cache = TextureCache::new();
        let second_calls = Rc::new(Cell::new(0));
        let second_id: Rc<Cell<Option<CallbackId>>> = Rc::new(Cell::new(None));

        let c = cache.clone();
        let slot = second_id.clone();
        cache.on_ready("tex1", move |_| {
            if let Some(id) = slot.get() {
                c.off_ready("tex1", id);
            }
        });
        let s = second_calls.clone();
        second_id.set(Some(cache.on_ready("tex1", move |_| s.set(s.get() + 1))));

        cache.ingest("tex1", bitmap(1));
        assert_eq!(second_calls.get(), 0);
    }

    #[test]
    fn test_late_subscriber_is_not_fired_retroactively() {
        let cache = TextureCache::new();
        cache.ingest("tex1", bitmap(1));
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        cache.on_ready("tex1", move |_| h.set(h.get() + 1));
        assert_eq!(hits.get(), 0);
        assert!(cache.get("tex1").is_some());
    }

    #[test]
    fn test_pending_and_failed_states() {
        let cache = TextureCache::new();
        cache.mark_pending("tex1");
        assert_eq!(cache.state("tex1"), TextureState::Pending);
        assert!(cache.get("tex1").is_none());

        cache.mark_failed("tex1");
        assert_eq!(cache.state("tex1"), TextureState::Failed);

        // Ready is terminal for pending/failed marks.
        cache.ingest("tex2", bitmap(3));
        cache.mark_failed("tex2");
        cache.mark_pending("tex2");
        assert!(matches!(cache.state("tex2"), TextureState::Ready(_)));
    }

    #[test]
    fn test_bitmap_rejects_mismatched_buffer() {
        assert!(Bitmap::from_rgba(2, 2, vec![0; 4]).is_none());
        let b = Bitmap::from_rgba(4, 2, vec![0; 32]).unwrap();
        assert_eq!(b.aspect_ratio(), 2.0);
    }

    #[test]
    fn test_bitmap_json_round_trip_keeps_pixels() {
        let b = bitmap(9);
        let json = serde_json::to_string(&b).unwrap();
        let back: Bitmap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
        assert!(!back.ptr_eq(&b));
    }

    #[tokio::test]
    async fn test_resolve_waits_for_ingest() {
        let cache = TextureCache::new();
        let b = bitmap(4);

        let pending = cache.resolve(Some("tex1"));
        let feeder = {
            let cache = cache.clone();
            let b = b.clone();
            async move {
                tokio::task::yield_now().await;
                cache.ingest("tex1", b);
            }
        };
        let (resolved, ()) = tokio::join!(pending, feeder);
        assert!(resolved.unwrap().ptr_eq(&b));
        assert_eq!(cache.subscriber_count("tex1"), 0);
    }

    #[tokio::test]
    async fn test_resolve_ready_texture_completes_immediately() {
        let cache = TextureCache::new();
        cache.ingest("tex1", bitmap(4));
        let resolved = cache.resolve(Some("tex1")).await.unwrap();
        assert_eq!(resolved, bitmap(4));
    }

    #[tokio::test]
    async fn test_resolve_reports_failure() {
        let cache = TextureCache::new();
        let pending = cache.resolve(Some("tex1"));
        let failer = {
            let cache = cache.clone();
            async move {
                tokio::task::yield_now().await;
                cache.mark_failed("tex1");
            }
        };
        let (resolved, ()) = tokio::join!(pending, failer);
        assert!(matches!(resolved, Err(TextureError::Failed(url)) if url == "tex1"));
    }

    #[tokio::test]
    async fn test_resolve_without_url_never_completes() {
        let cache = TextureCache::new();
        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            cache.resolve(None),
        )
        .await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_dropping_future_unsubscribes() {
        let cache = TextureCache::new();
        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            cache.resolve(Some("tex1")),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(cache.subscriber_count("tex1"), 0);
        // Ingesting afterwards must not touch the dropped future.
        cache.ingest("tex1", bitmap(1));
    }
}
