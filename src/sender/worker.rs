//! Worker thread driving socket I/O.
//!
//! The worker is the only consumer of the work queue and the only owner of
//! the socket, so every connect, write, backoff wait and completion happens on
//! one thread. It moves between these states:
//!
//! - *disconnected*: no socket; the next payload triggers a connect.
//! - *connected*: a socket is held between items.
//! - *sending*: a payload is being written, resuming partial writes.
//! - *backoff draining*: after a failure the socket is dropped and, for the
//!   backoff delay, every dequeued payload or flush is failed with the
//!   triggering error instead of being sent.
//! - *closed*: a close item was seen; the loop returns.

use std::{
    io,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, warn};

use crate::{error::SenderError, rate_limited_warner::RateLimitedWarner};

use super::{
    backoff::{BackoffPolicy, BackoffState},
    queue::{Completion, Dequeued, QueueConsumer, WorkItem},
    transport::{Connector, write_payload},
};

/// Name given to every worker thread.
pub const WORKER_THREAD_NAME: &str = "femtotcp-worker";

/// Whether the main loop keeps running after a backoff window.
enum Flow {
    Resume,
    Exit(Option<Completion>),
}

/// Spawn the worker thread.
///
/// The close completion, if any, is the thread's last action: it runs after
/// the loop has returned and the socket has been released, but before the
/// thread is joinable.
pub fn spawn_worker<C: Connector>(
    connector: C,
    consumer: QueueConsumer,
    backoff: BackoffPolicy,
    warn_interval: Duration,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.into())
        .spawn(move || {
            let close = Worker::new(connector, backoff, warn_interval).run(&consumer);
            drop(consumer);
            if let Some(completion) = close {
                completion(Ok(()));
            }
        })
}

pub(crate) struct Worker<C: Connector> {
    connector: C,
    connection: Option<C::Stream>,
    backoff: BackoffState,
    warner: RateLimitedWarner,
}

impl<C: Connector> Worker<C> {
    pub(crate) fn new(connector: C, backoff: BackoffPolicy, warn_interval: Duration) -> Self {
        Self {
            connector,
            connection: None,
            backoff: BackoffState::new(backoff),
            warner: RateLimitedWarner::new(warn_interval),
        }
    }

    /// Process items until a close item arrives or every producer is gone.
    pub(crate) fn run(mut self, queue: &QueueConsumer) -> Option<Completion> {
        let close = loop {
            let Some(item) = queue.dequeue() else {
                break None;
            };
            match item {
                WorkItem::Close { completion } => break Some(completion),
                WorkItem::Flush { completion } => completion(Ok(())),
                WorkItem::Payload { bytes, completion } => match self.deliver(&bytes) {
                    Ok(()) => completion(Ok(())),
                    Err(err) => {
                        warn!("FemtoTcpSender delivery failed: {err}");
                        completion(Err(err.clone()));
                        if let Flow::Exit(close) = self.drain_during_backoff(queue, &err) {
                            break close;
                        }
                    }
                },
            }
        };
        self.disconnect();
        self.warner.flush(|count| {
            warn!("FemtoTcpSender failed {count} queued items while the endpoint was unusable");
        });
        close
    }

    /// Write one payload, connecting first if no socket is held.
    fn deliver(&mut self, bytes: &[u8]) -> Result<(), SenderError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut stream = match self.connection.take() {
            Some(stream) => stream,
            None => self.connector.connect()?,
        };
        match write_payload(&mut stream, bytes) {
            Ok(()) => {
                self.connection = Some(stream);
                self.backoff.record_success();
                Ok(())
            }
            Err(err) => {
                self.connector.close(stream);
                Err(SenderError::send(err))
            }
        }
    }

    /// Fail every payload or flush dequeued during the backoff delay with
    /// `error`. A close item ends the wait immediately.
    fn drain_during_backoff(&mut self, queue: &QueueConsumer, error: &SenderError) -> Flow {
        let delay = self.backoff.next_delay();
        debug!(
            "FemtoTcpSender backing off for {delay:?} after {} consecutive failures",
            self.backoff.failures()
        );
        let deadline = Instant::now() + delay;
        let flow = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Flow::Resume;
            }
            match queue.dequeue_timeout(remaining) {
                Dequeued::Item(WorkItem::Close { completion }) => {
                    break Flow::Exit(Some(completion));
                }
                Dequeued::Item(item) => {
                    self.warner.record_failure();
                    item.complete(Err(error.clone()));
                }
                Dequeued::TimedOut => break Flow::Resume,
                Dequeued::Disconnected => break Flow::Exit(None),
            }
        };
        self.warner.warn_if_due(|count| {
            warn!("FemtoTcpSender failed {count} queued items while backing off: {error}");
        });
        flow
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.connection.take() {
            self.connector.close(stream);
        }
    }
}
