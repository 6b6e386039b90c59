// Shared helpers for the crate's unit tests.

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use chatline_protocol::framing::read_line;

/// Create a TCP pair: (client_stream, server_stream) on localhost. The client
/// end has a read timeout so a missing line fails the test instead of hanging.
pub fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

/// Read one line from the client end of a `tcp_pair`.
pub fn recv_line(reader: &mut BufReader<TcpStream>) -> String {
    read_line(reader, 1024).unwrap().expect("stream closed")
}

/// Read every line already sent, stopping at the first short timeout.
pub fn drain_lines(reader: &mut BufReader<TcpStream>) -> Vec<String> {
    reader
        .get_ref()
        .set_read_timeout(Some(Duration::from_millis(50)))
        .unwrap();
    let mut lines = Vec::new();
    while let Ok(Some(line)) = read_line(reader, 1024) {
        lines.push(line);
    }
    reader
        .get_ref()
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    lines
}
