//! Scripted connector and completion probes shared by sender tests.

use std::{
    collections::VecDeque,
    io::{self, Write},
    net::{SocketAddr, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::SenderError;

use super::{queue::Completion, transport::Connector};

/// Completion reported through a probe channel.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub tag: &'static str,
    pub error: Option<SenderError>,
}

/// Build a completion that reports its outcome on `tx` under `tag`.
pub(crate) fn completion_probe(tx: &mpsc::Sender<Outcome>, tag: &'static str) -> Completion {
    let tx = tx.clone();
    Box::new(move |result| {
        let _ = tx.send(Outcome {
            tag,
            error: result.err(),
        });
    })
}

#[derive(Default)]
struct WireState {
    bytes: Mutex<Vec<u8>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

/// In-memory stand-in for the remote end.
#[derive(Clone, Default)]
pub(crate) struct Wire {
    state: Arc<WireState>,
}

impl Wire {
    pub(crate) fn bytes(&self) -> Vec<u8> {
        self.state.bytes.lock().clone()
    }

    /// Connection attempts, successful or not.
    pub(crate) fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

/// Behaviour of one connection attempt.
pub(crate) enum Step {
    /// Fail immediately with `ConnectionRefused`.
    Refuse,
    /// Block for the duration, then report a connect timeout.
    Stall(Duration),
    /// Connect; the stream accepts `writes` write calls before breaking.
    Accept { writes: Option<usize> },
}

/// Connector following a fixed script, accepting once the script runs out.
pub(crate) struct ScriptedConnector {
    steps: VecDeque<Step>,
    wire: Wire,
}

impl ScriptedConnector {
    pub(crate) fn new(steps: Vec<Step>, wire: Wire) -> Self {
        Self {
            steps: steps.into(),
            wire,
        }
    }
}

pub(crate) struct MemoryStream {
    wire: Wire,
    writes_left: Option<usize>,
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writes_left.as_mut() {
            Some(0) => return Err(io::ErrorKind::BrokenPipe.into()),
            Some(left) => *left -= 1,
            None => {}
        }
        self.wire.state.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connector for ScriptedConnector {
    type Stream = MemoryStream;

    fn connect(&mut self) -> Result<MemoryStream, SenderError> {
        self.wire.state.connects.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(Step::Refuse) => Err(SenderError::connect(
                "scripted:0",
                io::ErrorKind::ConnectionRefused.into(),
            )),
            Some(Step::Stall(duration)) => {
                thread::sleep(duration);
                Err(SenderError::ConnectTimeout {
                    endpoint: "scripted:0".into(),
                    timeout: duration,
                })
            }
            Some(Step::Accept { writes }) => Ok(MemoryStream {
                wire: self.wire.clone(),
                writes_left: writes,
            }),
            None => Ok(MemoryStream {
                wire: self.wire.clone(),
                writes_left: None,
            }),
        }
    }

    fn close(&mut self, _stream: MemoryStream) {
        self.wire.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Loopback listener whose accept queue is full, so further connection
/// attempts go unanswered until they time out.
pub(crate) struct SaturatedListener {
    pub port: u16,
    _listener: Socket,
    _fillers: Vec<TcpStream>,
}

/// Fill a listener's accept queue. Returns `None` where the host answers
/// connections beyond the backlog instead of dropping them.
pub(crate) fn saturated_listener() -> Option<SaturatedListener> {
    let listener = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).ok()?;
    listener
        .bind(&SockAddr::from(SocketAddr::from(([127, 0, 0, 1], 0))))
        .ok()?;
    listener.listen(0).ok()?;
    let port = listener.local_addr().ok()?.as_socket()?.port();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let mut fillers = Vec::new();
    for _ in 0..32 {
        match TcpStream::connect_timeout(&addr, Duration::from_millis(100)) {
            Ok(stream) => fillers.push(stream),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                return Some(SaturatedListener {
                    port,
                    _listener: listener,
                    _fillers: fillers,
                });
            }
            Err(_) => return None,
        }
    }
    None
}
