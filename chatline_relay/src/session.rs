// One connected peer, as seen by the coordinator.
//
// A `Session` holds the write half of a client's `TcpStream` (a
// `try_clone` of the socket whose read half stays in the connection's
// handler thread), the nickname claimed in the handshake, and a liveness
// flag. Only the coordinator thread writes to it.
//
// A failed write marks the session dead and shuts the socket down. The
// shutdown makes the handler's blocking read return. The handler then reports
// the disconnect, which runs the normal departure path exactly once. Dead
// sessions are skipped by lookups and broadcasts until that happens.

use std::io::{self, BufWriter};
use std::net::{Shutdown, TcpStream};

use chatline_protocol::framing::write_line;
use chatline_protocol::message::ServerLine;
use chatline_protocol::types::SessionId;

pub struct Session {
    id: SessionId,
    nickname: String,
    writer: BufWriter<TcpStream>,
    alive: bool,
}

impl Session {
    pub fn new(id: SessionId, nickname: String, stream: TcpStream) -> Self {
        Self {
            id,
            nickname,
            writer: BufWriter::new(stream),
            alive: true,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// False once a write to this session has failed.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Write one line. On failure the session is marked dead and its socket
    /// shut down.
    pub fn send(&mut self, line: &ServerLine) -> io::Result<()> {
        if !self.alive {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "session already failed",
            ));
        }
        let result = write_line(&mut self.writer, &line.to_string());
        if result.is_err() {
            self.alive = false;
            self.close();
        }
        result
    }

    /// Shut the socket down in both directions. Safe to call repeatedly.
    pub fn close(&self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}
