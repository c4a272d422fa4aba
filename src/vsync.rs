//! Vsync waiter: runs vblank waits on a dedicated thread and reports frame
//! timings back to the engine.
//!
//! The engine asks for a vsync with an opaque baton. [`VsyncWaiter`] queues
//! the request for its worker thread, which issues exactly one vblank wait at
//! a time through the [`VblankClient`]. When the vblank fires, the engine's
//! [`VsyncEngine::on_vsync`] receives the baton with the frame start and
//! target times.

use std::{
    cell::Cell,
    ptr,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use log::{debug, error, warn};

use crate::{
    config::VsyncConfig,
    error::{EmbedderError, Result},
    vblank::{VblankSource, VblankTimestamp},
};

/// Engine side of the vsync handshake
pub trait VsyncEngine: Send + Sync {
    /// Reports the timing of the frame requested with `baton`.
    fn on_vsync(&self, baton: isize, frame_start_time_nanos: u64, frame_target_time_nanos: u64);
}

thread_local! {
    /// Engine slot whose `on_vsync` is running on this thread
    static DELIVERING: Cell<*const EngineSlot> = const { Cell::new(ptr::null()) };
}

/// The attached engine, locked for the whole of each `on_vsync` call
struct EngineSlot {
    engine: Mutex<Option<Arc<dyn VsyncEngine>>>,
    /// Set when the engine is detached from inside its own `on_vsync`
    detach_requested: AtomicBool,
}

impl EngineSlot {
    fn is_delivering(self: &Arc<Self>) -> bool {
        ptr::eq(DELIVERING.get(), Arc::as_ptr(self))
    }
}

/// Issues vblank waits for one engine.
///
/// The engine reference is cleared by [`VblankClient::on_engine_stop`]; a
/// vblank completing afterwards is dropped.
pub struct VblankClient {
    source: Box<dyn VblankSource>,
    engine: Arc<EngineSlot>,
    frame_interval_nanos: u64,
    vblank_timeout: Duration,
}

impl VblankClient {
    /// Creates a client delivering to `engine`
    pub fn new(
        engine: Arc<dyn VsyncEngine>,
        source: Box<dyn VblankSource>,
        config: &VsyncConfig,
    ) -> Self {
        let engine = if source.is_valid() {
            Some(engine)
        } else {
            error!("Failed to create a vblank client.");
            None
        };
        Self {
            source,
            engine: Arc::new(EngineSlot {
                engine: Mutex::new(engine),
                detach_requested: AtomicBool::new(false),
            }),
            frame_interval_nanos: config.frame_interval_nanos(),
            vblank_timeout: config.vblank_timeout,
        }
    }

    /// Whether the platform vblank source is usable
    pub fn is_valid(&self) -> bool {
        self.source.is_valid()
    }

    /// Detaches the engine. Vblanks completing after this are ignored.
    ///
    /// Called from inside `on_vsync`, the engine is detached as soon as that
    /// call returns.
    pub fn on_engine_stop(&self) {
        if self.engine.is_delivering() {
            self.engine.detach_requested.store(true, Ordering::Release);
            return;
        }
        *self
            .engine
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether an engine is still attached
    pub fn has_engine(&self) -> bool {
        if self.engine.is_delivering() {
            return !self.engine.detach_requested.load(Ordering::Acquire);
        }
        self.engine
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Waits for the next vblank and reports it for `baton`.
    ///
    /// Blocks until the vblank was delivered or the source dropped the
    /// request, so a second wait never starts while one is outstanding. A
    /// slow vblank only logs a warning every `vblank_timeout`. A message on
    /// `cancel`, or its sender going away, abandons the wait.
    pub fn await_vblank(&self, baton: isize, cancel: &Receiver<()>) -> Result<()> {
        let (done, delivered) = bounded::<()>(1);
        let engine = Arc::clone(&self.engine);
        let frame_interval_nanos = self.frame_interval_nanos;

        self.source.wait_vblank(Box::new(move |timestamp| {
            deliver_vsync(&engine, baton, timestamp, frame_interval_nanos);
            let _ = done.send(());
        }))?;

        loop {
            select! {
                recv(delivered) -> result => {
                    if result.is_err() {
                        warn!("The vblank request for baton {baton} was dropped");
                    }
                    return Ok(());
                }
                recv(cancel) -> _ => {
                    debug!("Abandoning the vblank wait for baton {baton}");
                    return Ok(());
                }
                default(self.vblank_timeout) => {
                    warn!(
                        "No vblank within {:?} for baton {baton}, still waiting",
                        self.vblank_timeout
                    );
                }
            }
        }
    }
}

fn deliver_vsync(
    slot: &Arc<EngineSlot>,
    baton: isize,
    timestamp: VblankTimestamp,
    frame_interval_nanos: u64,
) {
    let frame_start_time_nanos = timestamp.frame_start_nanos();
    let frame_target_time_nanos = frame_start_time_nanos + frame_interval_nanos;
    let mut engine = slot.engine.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(current) = engine.as_ref() {
        let outer = DELIVERING.replace(Arc::as_ptr(slot));
        current.on_vsync(baton, frame_start_time_nanos, frame_target_time_nanos);
        DELIVERING.set(outer);
    }
    if slot.detach_requested.load(Ordering::Acquire) {
        *engine = None;
    }
}

enum Message {
    RequestVblank(isize),
    Quit,
}

/// Serializes vsync requests onto a dedicated worker thread
pub struct VsyncWaiter {
    client: Arc<VblankClient>,
    sender: Sender<Message>,
    /// Dropped on stop to abandon the vblank wait in progress
    cancel: Option<Sender<()>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl VsyncWaiter {
    /// Starts a waiter for `engine`.
    ///
    /// Failures are logged and leave the waiter invalid; requests on an
    /// invalid waiter do nothing.
    pub fn new(
        engine: Arc<dyn VsyncEngine>,
        source: Box<dyn VblankSource>,
        config: VsyncConfig,
    ) -> Self {
        let client = Arc::new(VblankClient::new(engine, source, &config));
        match Self::start(Arc::clone(&client), &config) {
            Ok(waiter) => waiter,
            Err(err) => {
                error!("Vsync waiter disabled: {err}");
                let (sender, _) = unbounded();
                Self {
                    client,
                    sender,
                    cancel: None,
                    shutdown: Arc::new(AtomicBool::new(true)),
                    worker: None,
                }
            }
        }
    }

    /// Starts a waiter on an existing client, reporting why it could not.
    pub fn start(client: Arc<VblankClient>, config: &VsyncConfig) -> Result<Self> {
        if !client.is_valid() {
            return Err(EmbedderError::VblankUnavailable);
        }

        let (sender, receiver) = unbounded();
        let (cancel, cancelled) = bounded(0);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = {
            let client = Arc::clone(&client);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name(config.thread_name.clone())
                .spawn(move || run_vblank_loop(client, receiver, cancelled, shutdown))
                .map_err(EmbedderError::WorkerSpawn)?
        };

        Ok(Self {
            client,
            sender,
            cancel: Some(cancel),
            shutdown,
            worker: Some(worker),
        })
    }

    /// Whether requests are being served
    pub fn is_valid(&self) -> bool {
        self.worker.is_some() && !self.shutdown.load(Ordering::Acquire)
    }

    /// The client used by the worker
    pub fn client(&self) -> &Arc<VblankClient> {
        &self.client
    }

    /// Queues a vblank wait for `baton` and returns immediately.
    pub fn async_wait_for_vsync(&self, baton: isize) {
        if !self.is_valid() {
            debug!("Ignoring vsync request {baton} on an invalid waiter");
            return;
        }
        if self.sender.send(Message::RequestVblank(baton)).is_err() {
            error!("Invalid vblank thread.");
        }
    }

    /// Stops serving requests.
    ///
    /// Detaches the engine first, so no vsync is reported once this returns.
    /// A vblank wait in progress is abandoned and requests still queued are
    /// discarded. Called from inside [`VsyncEngine::on_vsync`], the engine
    /// receives nothing after that call returns.
    pub fn stop(&mut self) {
        self.client.on_engine_stop();
        self.shutdown.store(true, Ordering::Release);
        self.cancel = None;
        let _ = self.sender.send(Message::Quit);

        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for VsyncWaiter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_vblank_loop(
    client: Arc<VblankClient>,
    receiver: Receiver<Message>,
    cancelled: Receiver<()>,
    shutdown: Arc<AtomicBool>,
) {
    while let Ok(message) = receiver.recv() {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        match message {
            Message::Quit => break,
            Message::RequestVblank(baton) => {
                if let Err(err) = client.await_vblank(baton, &cancelled) {
                    error!("Vblank wait for baton {baton} failed: {err}");
                }
            }
        }
    }
    debug!("Vblank loop exited");
}
