// TCP server and coordinator loop for the chat relay.
//
// Architecture: thread-per-connection with a central `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): assigns each new
//   connection a `SessionId` and spawns a handler thread for it. It never
//   touches a connection's I/O itself, so a slow client cannot hold up
//   accepting others. An accept error is logged and the loop keeps going.
// - **Handler threads** (one per client): read the nickname line, send
//   `InternalEvent::Joined` with a write-half clone of the stream, then read
//   lines in a loop and forward each as `InternalEvent::LineFrom`. When the
//   loop ends for any reason (EOF, I/O error, oversized line) a scope guard
//   sends `InternalEvent::Disconnected` exactly once.
// - **Coordinator thread**: owns the `Router` (registry + reaction tracker)
//   and applies events one at a time. It is the only writer to client
//   streams. Each event's fan-out completes before the next event is taken,
//   so lines from one sender reach every peer in the order they were sent.
//
// Shutdown: the coordinator checks a `keep_running` flag (cleared by
// `RelayHandle::stop`) between events. On exit it joins the listener, then
// shuts down every socket it can reach: sessions still in the handshake
// (tracked in `PendingHandshakes`), joins still queued in the channel, and
// registered sessions. Every handler thread then sees EOF and exits.

use std::collections::HashMap;
use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use chatline_protocol::framing::read_line;
use chatline_protocol::types::SessionId;
use log::{debug, info, warn};
use scopeguard::defer;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::router::Router;
use crate::session::Session;

/// How often the listener and coordinator re-check `keep_running` when idle.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Events sent from handler threads to the coordinator.
enum InternalEvent {
    Joined {
        session_id: SessionId,
        nickname: String,
        stream: TcpStream,
    },
    LineFrom {
        session_id: SessionId,
        line: String,
    },
    Disconnected {
        session_id: SessionId,
    },
}

/// Accepted connections that have not yet sent their nickname, keyed by a
/// clone of their stream. `None` once the relay has closed the set, after
/// which new connections are refused.
///
/// A handler leaves the set and queues its `Joined` event under the same
/// lock, so every connection is either still here, already in the channel,
/// or refused when the coordinator shuts down.
struct PendingHandshakes {
    streams: Mutex<Option<HashMap<SessionId, TcpStream>>>,
}

impl PendingHandshakes {
    fn new() -> Self {
        Self {
            streams: Mutex::new(Some(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<HashMap<SessionId, TcpStream>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a connection. Returns false if the relay is stopping.
    fn track(&self, session_id: SessionId, stream: TcpStream) -> bool {
        match self.lock().as_mut() {
            Some(streams) => {
                streams.insert(session_id, stream);
                true
            }
            None => false,
        }
    }

    /// Stop tracking a connection and run `announce` while still holding the
    /// lock. Returns false, without running it, if the relay already shut
    /// the connection down.
    fn finish(&self, session_id: SessionId, announce: impl FnOnce() -> bool) -> bool {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(streams) => streams.remove(&session_id).is_some() && announce(),
            None => false,
        }
    }

    fn forget(&self, session_id: SessionId) {
        if let Some(streams) = self.lock().as_mut() {
            streams.remove(&session_id);
        }
    }

    /// Shut down every tracked connection and refuse any further ones.
    fn close(&self) {
        let Some(streams) = self.lock().take() else {
            return;
        };
        for (session_id, stream) in streams {
            debug!("closing session {session_id} mid-handshake");
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Bind the listener and start the relay on background threads. Returns a
/// handle for stopping it and the actual bound address (useful when port 0
/// is used to let the OS pick a free port).
pub fn start_relay(config: RelayConfig) -> Result<(RelayHandle, SocketAddr), RelayError> {
    let bind_addr = config.bind_addr();
    let bind_error = |source| RelayError::Bind {
        addr: bind_addr.clone(),
        source,
    };
    let listener = TcpListener::bind(&bind_addr).map_err(bind_error)?;
    let addr = listener.local_addr().map_err(bind_error)?;
    info!("chat relay listening on {addr}");

    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = Arc::clone(&keep_running);
    let thread = thread::spawn(move || {
        run_relay(listener, &config, &keep_running_clone);
    });

    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Coordinator loop. Runs until `keep_running` is cleared.
fn run_relay(listener: TcpListener, config: &RelayConfig, keep_running: &Arc<AtomicBool>) {
    let mut router = Router::new();
    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();
    let pending = Arc::new(PendingHandshakes::new());

    let keep_running_listener = Arc::clone(keep_running);
    let listener_config = config.clone();
    let listener_pending = Arc::clone(&pending);
    let acceptor = thread::spawn(move || {
        accept_loop(
            &listener,
            &listener_config,
            &tx,
            &listener_pending,
            &keep_running_listener,
        );
    });

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => handle_event(&mut router, event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(
        "chat relay stopping, closing {} session(s)",
        router.registry().len()
    );
    keep_running.store(false, Ordering::SeqCst);
    let _ = acceptor.join();
    pending.close();
    for event in rx.try_iter() {
        if let InternalEvent::Joined {
            session_id, stream, ..
        } = event
        {
            debug!("closing session {session_id} before it joined");
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
    router.shutdown();
}

/// Accept connections and spawn one handler thread per client. Non-blocking
/// so the loop can notice `keep_running` being cleared.
fn accept_loop(
    listener: &TcpListener,
    config: &RelayConfig,
    tx: &Sender<InternalEvent>,
    pending: &Arc<PendingHandshakes>,
    keep_running: &Arc<AtomicBool>,
) {
    if let Err(e) = listener.set_nonblocking(true) {
        warn!("listener cannot be made non-blocking: {e}");
    }
    let mut next_session_id = 0u64;

    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let session_id = SessionId(next_session_id);
                next_session_id += 1;
                debug!("accepted {peer} as session {session_id}");

                let tracked = match prepare_stream(&stream, config) {
                    Ok(tracked) => tracked,
                    Err(e) => {
                        warn!("dropping connection from {peer}: {e}");
                        continue;
                    }
                };
                if !pending.track(session_id, tracked) {
                    debug!("relay stopping, refusing {peer}");
                    break;
                }
                let tx_handler = tx.clone();
                let handler_pending = Arc::clone(pending);
                let max_line_bytes = config.max_line_bytes;
                thread::spawn(move || {
                    connection_loop(
                        stream,
                        session_id,
                        &tx_handler,
                        &handler_pending,
                        max_line_bytes,
                    );
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                warn!("accept failed: {e}");
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// Accepted sockets can inherit the listener's non-blocking mode on some
/// platforms; handlers need blocking reads. Returns a clone of the stream for
/// `PendingHandshakes`.
fn prepare_stream(stream: &TcpStream, config: &RelayConfig) -> std::io::Result<TcpStream> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(config.write_timeout())?;
    stream.try_clone()
}

/// Per-connection handler. Runs in its own thread.
fn connection_loop(
    stream: TcpStream,
    session_id: SessionId,
    tx: &Sender<InternalEvent>,
    pending: &PendingHandshakes,
    max_line_bytes: usize,
) {
    // No-op once the handshake has completed.
    defer! {
        pending.forget(session_id);
    }

    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!("session {session_id}: cannot clone stream: {e}");
            return;
        }
    };
    let mut reader = BufReader::new(stream);

    // The first line is the nickname, taken verbatim.
    let nickname = match read_line(&mut reader, max_line_bytes) {
        Ok(Some(nickname)) => nickname,
        Ok(None) => {
            debug!("session {session_id} closed before sending a nickname");
            return;
        }
        Err(e) => {
            debug!("session {session_id} handshake failed: {e}");
            return;
        }
    };

    let joined = InternalEvent::Joined {
        session_id,
        nickname,
        stream: write_stream,
    };
    if !pending.finish(session_id, || tx.send(joined).is_ok()) {
        return;
    }

    // From here on the coordinator knows this session and must hear about
    // its departure exactly once, whichever way the loop below ends.
    defer! {
        let _ = tx.send(InternalEvent::Disconnected { session_id });
    }

    loop {
        match read_line(&mut reader, max_line_bytes) {
            Ok(Some(line)) => {
                if tx.send(InternalEvent::LineFrom { session_id, line }).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("session {session_id} read failed: {e}");
                break;
            }
        }
    }
}

/// Apply a single event to the router.
fn handle_event(router: &mut Router, event: InternalEvent) {
    match event {
        InternalEvent::Joined {
            session_id,
            nickname,
            stream,
        } => {
            router.join(Session::new(session_id, nickname, stream));
        }
        InternalEvent::LineFrom { session_id, line } => {
            router.handle_line(session_id, &line);
        }
        InternalEvent::Disconnected { session_id } => {
            router.leave(session_id);
        }
    }
}
