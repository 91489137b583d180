//! The worker loop and the thread it runs on.
//!
//! A worker handles host messages one at a time, in arrival order, and
//! ticks created roots on its own frame timer. [`spawn_worker`] starts it on
//! a dedicated thread with a current-thread tokio runtime, so everything the
//! worker owns stays `!Send`.

use std::io;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tokio::time::{Interval, MissedTickBehavior};

use crate::controller::Controller;
use crate::protocol::{HostMessage, ProtocolError, WorkerMessage};
use crate::scene::SceneBuilder;
use crate::texture::TextureError;

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to start worker: {0}")]
    Io(#[from] io::Error),
    #[error("worker channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error("worker thread panicked")]
    Panicked,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    frame_interval: Option<Duration>,
    thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            frame_interval: Some(DEFAULT_FRAME_INTERVAL),
            thread_name: "canvas-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// How often created roots are asked to render a frame.
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Never tick frames; the scene builder drives rendering itself.
    pub fn without_frames(mut self) -> Self {
        self.frame_interval = None;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

pub struct Worker<B: SceneBuilder> {
    config: WorkerConfig,
    controller: Controller<B>,
}

impl<B: SceneBuilder> Worker<B> {
    pub fn new(config: WorkerConfig, builder: B, outbound: mpsc::UnboundedSender<WorkerMessage>) -> Self {
        Self {
            config,
            controller: Controller::new(builder, outbound),
        }
    }

    pub fn controller(&self) -> &Controller<B> {
        &self.controller
    }

    /// Process host messages until the inbound channel closes.
    ///
    /// Must run inside a tokio `LocalSet`.
    pub async fn run(mut self, mut inbound: mpsc::UnboundedReceiver<HostMessage>) {
        let _ = env_logger::try_init();
        log::info!("Worker started");

        let mut ticker = self.config.frame_interval.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => self.controller.handle(message),
                    None => break,
                },
                _ = next_tick(&mut ticker) => self.controller.tick_frames(),
            }
        }

        log::info!(
            "Host channel closed, stopping worker with {} live canvases",
            self.controller.live_count()
        );
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Host-side end of a worker thread.
pub struct WorkerHandle {
    sender: mpsc::UnboundedSender<HostMessage>,
    receiver: mpsc::UnboundedReceiver<WorkerMessage>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// A sender for the worker's inbound channel, e.g. for a
    /// [`HostBridge`](crate::host::HostBridge).
    pub fn sender(&self) -> mpsc::UnboundedSender<HostMessage> {
        self.sender.clone()
    }

    pub fn post(&self, message: HostMessage) -> Result<(), WorkerError> {
        self.sender
            .send(message)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn post_json(&self, json: &str) -> Result<(), WorkerError> {
        self.post(HostMessage::from_json(json)?)
    }

    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        self.receiver.recv().await
    }

    /// Wait for the next worker message from a thread without a runtime.
    pub fn blocking_recv(&mut self) -> Option<WorkerMessage> {
        self.receiver.blocking_recv()
    }

    pub fn try_recv(&mut self) -> Option<WorkerMessage> {
        self.receiver.try_recv().ok()
    }

    /// Close the inbound channel and wait for the worker to drain it.
    ///
    /// Senders handed out by [`WorkerHandle::sender`] keep the worker alive
    /// until they are dropped too.
    pub fn shutdown(self) -> Result<(), WorkerError> {
        let WorkerHandle {
            sender,
            receiver,
            join,
        } = self;
        drop(sender);
        drop(receiver);
        join.join().map_err(|_| WorkerError::Panicked)
    }
}

/// Start a worker on its own thread.
///
/// `make_builder` runs on the worker thread, so the scene builder itself
/// need not be `Send`.
pub fn spawn_worker<B, F>(config: WorkerConfig, make_builder: F) -> Result<WorkerHandle, WorkerError>
where
    B: SceneBuilder,
    F: FnOnce() -> B + Send + 'static,
{
    let (host_tx, host_rx) = mpsc::unbounded_channel::<HostMessage>();
    let (worker_tx, worker_rx) = mpsc::unbounded_channel::<WorkerMessage>();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let join = std::thread::Builder::new()
        .name(config.thread_name.clone())
        .spawn(move || {
            let local = LocalSet::new();
            let worker = Worker::new(config, make_builder(), worker_tx);
            local.block_on(&runtime, worker.run(host_rx));
        })?;

    Ok(WorkerHandle {
        sender: host_tx,
        receiver: worker_rx,
        join,
    })
}
