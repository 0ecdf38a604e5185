//! The message server: a single-threaded, readiness-driven socket loop.

use super::types::MessageHandler;
use log::{debug, warn};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Upper bound on how long cancellation can go unobserved while idle.
///
/// Also the worst-case extra latency per exchange and the period of the
/// idle wakeup each locked session pays: the loop polls its sockets on
/// this interval instead of blocking in an OS readiness call. Shortening
/// it trades idle CPU for responsiveness.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const READ_CHUNK: usize = 1024;

/// Listener for messages from other instances.
///
/// Binding happens in [`bind`](MessageServer::bind), so the realized port is
/// known before the event loop thread exists. The loop itself multiplexes
/// the listening socket and every accepted connection on one thread via a
/// [`Poller`]; each connection carries one request/response pair and is then
/// closed.
pub(crate) struct MessageServer {
    listener: TcpListener,
    port: u16,
    handler: MessageHandler,
    cancel: Arc<AtomicBool>,
}

impl MessageServer {
    /// Bind to an OS-assigned ephemeral loopback port.
    pub(crate) fn bind(handler: MessageHandler) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            handler,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The port the listener is bound to.
    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Spawn the event loop on a dedicated named thread.
    pub(crate) fn start(self, id: &str) -> io::Result<ServerHandle> {
        let cancel = Arc::clone(&self.cancel);
        let thread = thread::Builder::new()
            .name(format!("applock `{id}` server"))
            .spawn(move || self.run())?;
        Ok(ServerHandle { cancel, thread })
    }

    fn run(self) {
        let MessageServer {
            listener,
            port,
            handler,
            cancel,
        } = self;

        debug!("message server listening on port {port}");
        let mut poller = Poller::new(listener);
        while let Some(requests) = poller.wait(&cancel) {
            for request in requests {
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                answer(&handler, request);
            }
        }
        debug!("message server on port {port} stopped");
        // listener and any pending connections close when the poller drops
    }
}

/// Running server thread; cancellation is signalled through a shared flag
/// the loop checks around every blocking point.
pub(crate) struct ServerHandle {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ServerHandle {
    /// Stop the loop and wait for its thread to exit. The flag is observed
    /// within one poll interval even when the loop is idle.
    pub(crate) fn stop(self) {
        self.cancel.store(true, Ordering::SeqCst);
        if self.thread.join().is_err() {
            warn!("message server thread panicked during shutdown");
        }
    }
}

/// Apply the handler to one complete request and send the reply back.
///
/// A panicking handler is contained: the connection is dropped without a
/// reply and the loop keeps serving other peers.
fn answer(handler: &MessageHandler, request: (TcpStream, Vec<u8>)) {
    let (mut conn, bytes) = request;
    let message = String::from_utf8_lossy(&bytes);

    let reply = match catch_unwind(AssertUnwindSafe(|| (**handler)(&message))) {
        Ok(reply) => reply,
        Err(_) => {
            warn!("message handler panicked; closing connection without a reply");
            return;
        }
    };

    // Blocking mode for the reply so large answers are written in full.
    if let Err(e) = conn.set_nonblocking(false) {
        warn!("failed to reconfigure connection for reply: {e}");
        return;
    }
    if let Err(e) = conn.write_all(reply.as_bytes()) {
        warn!("failed to write reply: {e}");
    }
}

/// Waits for the listening socket or any accepted connection to become
/// ready, with a cancellation check before sleeping and after waking.
struct Poller {
    listener: TcpListener,
    pending: Vec<TcpStream>,
}

/// Result of one non-blocking read pass over a connection.
enum Burst {
    /// Nothing available yet; keep the connection registered.
    NotReady,
    /// Everything the peer had queued for this read cycle.
    Message(Vec<u8>),
    /// The peer disappeared without sending a request.
    Gone,
}

impl Poller {
    fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            pending: Vec::new(),
        }
    }

    /// Block until at least one request is ready or cancellation is
    /// observed. Returns `None` when cancelled.
    fn wait(&mut self, cancel: &AtomicBool) -> Option<Vec<(TcpStream, Vec<u8>)>> {
        loop {
            if cancel.load(Ordering::SeqCst) {
                return None;
            }

            self.accept_new();
            let ready = self.drain_readable();
            if !ready.is_empty() {
                return Some(ready);
            }

            thread::sleep(POLL_INTERVAL);
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
        }
    }

    /// Accept every connection currently queued on the listener.
    fn accept_new(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((conn, peer)) => {
                    if let Err(e) = conn.set_nonblocking(true) {
                        warn!("failed to configure connection from {peer}: {e}");
                        continue;
                    }
                    debug!("accepted connection from {peer}");
                    self.pending.push(conn);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!("accept failed: {e}");
                    return;
                }
            }
        }
    }

    /// Collect a complete request from every connection with data waiting.
    fn drain_readable(&mut self) -> Vec<(TcpStream, Vec<u8>)> {
        let mut ready = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            match read_burst(&mut self.pending[i]) {
                Burst::NotReady => i += 1,
                Burst::Message(bytes) => {
                    let conn = self.pending.swap_remove(i);
                    ready.push((conn, bytes));
                }
                Burst::Gone => {
                    self.pending.swap_remove(i);
                }
            }
        }
        ready
    }
}

/// Read everything `conn` has available right now.
///
/// "No more data in this read cycle" is taken as the end of the request; a
/// request split across bursts would be truncated (see the module docs).
fn read_burst(conn: &mut TcpStream) -> Burst {
    let mut buf = [0u8; READ_CHUNK];
    let mut collected = Vec::new();
    loop {
        match conn.read(&mut buf) {
            Ok(0) => {
                // Peer closed; whatever arrived before the close is the request.
                return if collected.is_empty() {
                    Burst::Gone
                } else {
                    Burst::Message(collected)
                };
            }
            Ok(n) => collected.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return if collected.is_empty() {
                    Burst::NotReady
                } else {
                    Burst::Message(collected)
                };
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("connection read failed: {e}");
                return Burst::Gone;
            }
        }
    }
}
