//! Bounded work queue shared by producers and the worker thread.
//!
//! Producers block while the queue is full. Closing the sender seals the queue,
//! fires a cancellation signal that releases blocked producers, and posts the
//! close item on a separate single-slot channel once no producer is
//! mid-enqueue. The consumer only takes the close item after the main queue is
//! empty, so it is always the last item the worker sees, and sealing never
//! waits for the worker to make room.

use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Select, Sender, TryRecvError, TrySendError, bounded};
use parking_lot::{Mutex, RwLock};

use crate::error::SenderError;

/// Callback invoked exactly once with the outcome of a work item.
pub type Completion = Box<dyn FnOnce(Result<(), SenderError>) + Send + 'static>;

/// Unit of queued work.
pub enum WorkItem {
    /// Bytes written verbatim to the socket.
    Payload { bytes: Vec<u8>, completion: Completion },
    /// Barrier completing once every earlier item was handed to the socket.
    Flush { completion: Completion },
    /// Terminal marker; the worker exits after processing it.
    Close { completion: Completion },
}

impl WorkItem {
    /// Consume the item, reporting `result` to its completion.
    pub fn complete(self, result: Result<(), SenderError>) {
        match self {
            WorkItem::Payload { completion, .. }
            | WorkItem::Flush { completion }
            | WorkItem::Close { completion } => completion(result),
        }
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Payload { bytes, .. } => f
                .debug_struct("Payload")
                .field("len", &bytes.len())
                .finish_non_exhaustive(),
            WorkItem::Flush { .. } => f.write_str("Flush"),
            WorkItem::Close { .. } => f.write_str("Close"),
        }
    }
}

/// Reason an item was not accepted. The item is handed back untouched.
#[derive(Debug)]
pub enum Rejected {
    /// The queue no longer accepts input.
    Sealed(WorkItem),
    /// The producer was blocked on a full queue when shutdown began.
    Cancelled(WorkItem),
}

/// One-shot signal that wakes producers blocked in [`WorkQueue::enqueue`].
///
/// Firing drops the only sender of a zero-capacity channel, which makes every
/// pending and future receive on it ready.
struct CancelSignal {
    trigger: Mutex<Option<Sender<()>>>,
    fired: Receiver<()>,
}

impl CancelSignal {
    fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            trigger: Mutex::new(Some(tx)),
            fired: rx,
        }
    }

    fn fire(&self) {
        self.trigger.lock().take();
    }
}

/// Producer side of the queue.
pub struct WorkQueue {
    tx: Sender<WorkItem>,
    // Holds at most the single close item posted by the first sealer.
    last_tx: Sender<WorkItem>,
    sealed: AtomicBool,
    // Held shared for the duration of every enqueue; sealing takes it
    // exclusively before posting the close item.
    admission: RwLock<()>,
    cancel: CancelSignal,
}

/// Consumer side of the queue, owned by the worker.
pub struct QueueConsumer {
    rx: Receiver<WorkItem>,
    last_rx: Receiver<WorkItem>,
}

/// Outcome of a timed dequeue.
#[derive(Debug)]
pub enum Dequeued {
    Item(WorkItem),
    TimedOut,
    /// Every producer handle is gone.
    Disconnected,
}

/// Create a queue holding at most `capacity` items.
pub fn work_queue(capacity: usize) -> (WorkQueue, QueueConsumer) {
    let (tx, rx) = bounded(capacity);
    let (last_tx, last_rx) = bounded(1);
    (
        WorkQueue {
            tx,
            last_tx,
            sealed: AtomicBool::new(false),
            admission: RwLock::new(()),
            cancel: CancelSignal::new(),
        },
        QueueConsumer { rx, last_rx },
    )
}

impl WorkQueue {
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Number of items currently queued, not counting a pending close item.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Append `item`, blocking while the queue is full.
    pub fn enqueue(&self, item: WorkItem) -> Result<(), Rejected> {
        let _admit = self.admission.read();
        if self.is_sealed() {
            return Err(Rejected::Sealed(item));
        }
        let item = match self.tx.try_send(item) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(item)) => item,
            Err(TrySendError::Disconnected(item)) => return Err(Rejected::Sealed(item)),
        };

        let mut sel = Select::new();
        let send_op = sel.send(&self.tx);
        sel.recv(&self.cancel.fired);
        let oper = sel.select();
        if oper.index() == send_op {
            oper.send(&self.tx, item)
                .map_err(|err| Rejected::Sealed(err.into_inner()))
        } else {
            let _ = oper.recv(&self.cancel.fired);
            Err(Rejected::Cancelled(item))
        }
    }

    /// Seal the queue and post `last` as its final item. Never blocks on a
    /// full queue.
    ///
    /// Only the first caller seals; later callers get their item back. The
    /// item is also handed back if the consumer has gone away.
    pub fn seal_with(&self, last: WorkItem) -> Result<(), WorkItem> {
        if !self.seal() {
            return Err(last);
        }
        self.last_tx.try_send(last).map_err(|err| err.into_inner())
    }

    /// Seal the queue without appending anything. Returns `true` for the call
    /// that performed the seal.
    pub fn seal(&self) -> bool {
        if self.sealed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.fire();
        // Wait for producers that passed the sealed check to settle.
        drop(self.admission.write());
        true
    }
}

impl QueueConsumer {
    /// Block until an item is available. `None` once all producers are gone.
    pub fn dequeue(&self) -> Option<WorkItem> {
        match self.next(None) {
            Dequeued::Item(item) => Some(item),
            Dequeued::TimedOut | Dequeued::Disconnected => None,
        }
    }

    /// Block for at most `timeout` waiting for an item.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Dequeued {
        self.next(Some(Instant::now() + timeout))
    }

    fn next(&self, deadline: Option<Instant>) -> Dequeued {
        loop {
            // The close item is posted only after every admitted item reached
            // the main queue, so once it is visible an empty main queue is
            // final.
            let closing = !self.last_rx.is_empty();
            let producers_gone = match self.rx.try_recv() {
                Ok(item) => return Dequeued::Item(item),
                Err(err) => err.is_disconnected(),
            };
            if closing || producers_gone {
                match self.last_rx.try_recv() {
                    Ok(item) => return Dequeued::Item(item),
                    Err(TryRecvError::Disconnected) if producers_gone => {
                        return Dequeued::Disconnected;
                    }
                    Err(_) => {}
                }
            }

            let mut sel = Select::new();
            sel.recv(&self.rx);
            sel.recv(&self.last_rx);
            match deadline {
                None => {
                    sel.ready();
                }
                Some(deadline) => {
                    if sel.ready_deadline(deadline).is_err() {
                        return Dequeued::TimedOut;
                    }
                }
            }
        }
    }

    /// Take every item available right now without blocking.
    #[cfg(test)]
    pub fn drain_ready(&self) -> impl Iterator<Item = WorkItem> + '_ {
        std::iter::from_fn(move || match self.next(Some(Instant::now())) {
            Dequeued::Item(item) => Some(item),
            Dequeued::TimedOut | Dequeued::Disconnected => None,
        })
    }
}
