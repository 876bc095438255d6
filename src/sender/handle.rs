//! Public sender type exported by the crate.

use std::{
    fmt, io, mem,
    sync::atomic::{AtomicBool, Ordering},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::bounded;
use log::warn;
use parking_lot::Mutex;

use crate::error::SenderError;

use super::{
    config::{DEFAULT_CLOSE_TIMEOUT, SenderConfig},
    queue::{QueueConsumer, Rejected, WorkItem, WorkQueue, work_queue},
    transport::{Connector, TcpConnector},
    worker::spawn_worker,
};

type Launcher = Box<dyn FnOnce(QueueConsumer) -> io::Result<JoinHandle<()>> + Send>;

enum WorkerSlot {
    /// Not started yet; holds what the worker needs.
    Idle {
        consumer: QueueConsumer,
        launch: Launcher,
    },
    Running(JoinHandle<()>),
    /// Spawning the thread failed; the sender can never deliver.
    Failed(SenderError),
    Stopped,
}

/// Ordered TCP sender delivering byte payloads from any thread.
///
/// Payloads are queued and written by a single background worker in the
/// order they were accepted. Every accepted item gets exactly one completion.
/// Completions run on the worker thread and must not block on this sender;
/// [`flush_blocking`](Self::flush_blocking) and
/// [`close_blocking`](Self::close_blocking) cannot succeed from inside one. A
/// panicking completion takes the worker down with it.
pub struct FemtoTcpSender {
    config: SenderConfig,
    queue: WorkQueue,
    worker: Mutex<WorkerSlot>,
    started: AtomicBool,
}

impl FemtoTcpSender {
    /// Construct a sender. The worker starts on [`initialize`](Self::initialize)
    /// or on the first send.
    pub fn new(config: SenderConfig) -> Self {
        let connector = TcpConnector::from(&config);
        Self::with_connector(config, connector)
    }

    pub(crate) fn with_connector<C: Connector>(config: SenderConfig, connector: C) -> Self {
        let (queue, consumer) = work_queue(config.capacity);
        let backoff = config.backoff.clone();
        let warn_interval = config.warn_interval;
        let launch: Launcher =
            Box::new(move |consumer| spawn_worker(connector, consumer, backoff, warn_interval));
        Self {
            config,
            queue,
            worker: Mutex::new(WorkerSlot::Idle { consumer, launch }),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.queue.is_sealed()
    }

    /// Number of items waiting for the worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Start the worker. Calling this again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SenderError::Configuration`] when the configuration asks for
    /// something the transport cannot do, such as secure transport. The
    /// worker is never started in that case.
    pub fn initialize(&self) -> Result<(), SenderError> {
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut slot = self.worker.lock();
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }
        self.config.validate().map_err(SenderError::Configuration)?;
        if self.queue.is_sealed() {
            return Ok(());
        }
        match mem::replace(&mut *slot, WorkerSlot::Stopped) {
            WorkerSlot::Idle { consumer, launch } => match launch(consumer) {
                Ok(handle) => {
                    *slot = WorkerSlot::Running(handle);
                    self.started.store(true, Ordering::Release);
                    Ok(())
                }
                Err(err) => {
                    let err = SenderError::WorkerSpawn(err.into());
                    *slot = WorkerSlot::Failed(err.clone());
                    Err(err)
                }
            },
            WorkerSlot::Failed(err) => {
                *slot = WorkerSlot::Failed(err.clone());
                Err(err)
            }
            other => {
                *slot = other;
                Ok(())
            }
        }
    }

    /// Queue `payload` for delivery, blocking while the queue is full.
    ///
    /// The completion receives `Ok(())` once every byte was handed to the
    /// socket, or the error that prevented it. After [`close`](Self::close)
    /// the completion is invoked at once with `Ok(())` and nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns [`SenderError::Cancelled`] if the sender closed while this
    /// call was waiting for queue space. The completion is not invoked then.
    pub fn send<F>(&self, payload: impl Into<Vec<u8>>, completion: F) -> Result<(), SenderError>
    where
        F: FnOnce(Result<(), SenderError>) + Send + 'static,
    {
        self.submit(WorkItem::Payload {
            bytes: payload.into(),
            completion: Box::new(completion),
        })
    }

    /// Queue a barrier that completes once every earlier payload was handed to
    /// the socket. This does not wait for the peer to acknowledge anything.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub fn flush<F>(&self, completion: F) -> Result<(), SenderError>
    where
        F: FnOnce(Result<(), SenderError>) + Send + 'static,
    {
        self.submit(WorkItem::Flush {
            completion: Box::new(completion),
        })
    }

    fn submit(&self, item: WorkItem) -> Result<(), SenderError> {
        if self.queue.is_sealed() {
            item.complete(Ok(()));
            return Ok(());
        }
        if let Err(err) = self.initialize() {
            item.complete(Err(err));
            return Ok(());
        }
        match self.queue.enqueue(item) {
            Ok(()) => Ok(()),
            Err(Rejected::Sealed(item)) => {
                item.complete(Ok(()));
                Ok(())
            }
            Err(Rejected::Cancelled(_)) => Err(SenderError::Cancelled),
        }
    }

    /// Close the sender after everything queued so far was processed.
    ///
    /// Never blocks on a full queue. The completion runs on the worker thread
    /// as its last action, after the socket was released; use
    /// [`close_blocking`](Self::close_blocking) to also wait for the thread to
    /// be joined. Later calls complete immediately with `Ok(())`.
    pub fn close<F>(&self, completion: F)
    where
        F: FnOnce(Result<(), SenderError>) + Send + 'static,
    {
        let close = WorkItem::Close {
            completion: Box::new(completion),
        };
        let mut slot = self.worker.lock();
        if matches!(*slot, WorkerSlot::Running(_)) {
            drop(slot);
            if let Err(close) = self.queue.seal_with(close) {
                close.complete(Ok(()));
            }
            return;
        }
        self.queue.seal();
        if matches!(*slot, WorkerSlot::Idle { .. }) {
            *slot = WorkerSlot::Stopped;
        }
        drop(slot);
        close.complete(Ok(()));
    }

    /// Flush and wait up to `timeout` for the barrier to complete.
    ///
    /// Returns `true` when the flush completed without error.
    pub fn flush_blocking(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        let queued = self.flush(move |result| {
            let _ = ack_tx.send(result.is_ok());
        });
        if queued.is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).unwrap_or(false)
    }

    /// Close and wait up to `timeout` for the worker thread to exit.
    ///
    /// Returns `false` if the worker was still running at the deadline, for
    /// instance because a write is stuck on a peer that stopped reading. The
    /// close still takes effect once the worker gets free. Called from a
    /// completion, this only requests the close and returns `false`.
    pub fn close_blocking(&self, timeout: Duration) -> bool {
        if self.on_worker_thread() {
            self.close(|_| {});
            return false;
        }
        let deadline = Instant::now() + timeout;
        let (ack_tx, ack_rx) = bounded(1);
        self.close(move |_| {
            let _ = ack_tx.send(());
        });
        if ack_rx.recv_deadline(deadline).is_err() {
            return false;
        }
        self.join_worker(deadline)
    }

    fn on_worker_thread(&self) -> bool {
        matches!(
            &*self.worker.lock(),
            WorkerSlot::Running(handle) if handle.thread().id() == thread::current().id()
        )
    }

    fn join_worker(&self, deadline: Instant) -> bool {
        let handle = {
            let mut slot = self.worker.lock();
            match mem::replace(&mut *slot, WorkerSlot::Stopped) {
                WorkerSlot::Running(handle) => handle,
                other => {
                    *slot = other;
                    return true;
                }
            }
        };
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                *self.worker.lock() = WorkerSlot::Running(handle);
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if handle.join().is_err() {
            warn!("FemtoTcpSender: worker thread panicked");
        }
        true
    }
}

impl Drop for FemtoTcpSender {
    fn drop(&mut self) {
        if self.on_worker_thread() {
            // Dropped from a completion: the worker exits once it returns,
            // and the handle is detached with the slot.
            self.close(|_| {});
            return;
        }
        if !self.close_blocking(DEFAULT_CLOSE_TIMEOUT) {
            warn!(
                "FemtoTcpSender: worker did not stop within {DEFAULT_CLOSE_TIMEOUT:?}; detaching"
            );
        }
    }
}

impl fmt::Debug for FemtoTcpSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FemtoTcpSender")
            .field("endpoint", &self.config.endpoint)
            .field("queued", &self.queued())
            .field("closed", &self.is_closed())
            .finish()
    }
}
