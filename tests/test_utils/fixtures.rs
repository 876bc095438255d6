//! Loopback listeners used to observe what a sender puts on the wire.

use std::{
    io::Read,
    net::TcpListener,
    sync::mpsc,
    thread::{self, JoinHandle},
    time::Duration,
};

use rstest::fixture;

/// Listener accepting connections on loopback and recording each one's bytes.
///
/// Every accepted connection is read until the peer shuts it down; its bytes
/// are then reported as one entry.
pub struct CollectingServer {
    pub port: u16,
    connections: mpsc::Receiver<Vec<u8>>,
    _acceptor: JoinHandle<()>,
}

impl CollectingServer {
    /// Wait for the next connection to finish and return its bytes.
    pub fn next_connection(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.connections.recv_timeout(timeout).ok()
    }
}

/// Return a running collecting server bound to an ephemeral port.
#[fixture]
pub fn collecting_server() -> CollectingServer {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
    let port = listener.local_addr().expect("listener has address").port();
    let (tx, rx) = mpsc::channel();
    let acceptor = thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let tx = tx.clone();
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf);
                let _ = tx.send(buf);
            });
        }
    });
    CollectingServer {
        port,
        connections: rx,
        _acceptor: acceptor,
    }
}

/// Return a loopback port with nothing listening on it.
#[fixture]
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
    listener.local_addr().expect("listener has address").port()
}
