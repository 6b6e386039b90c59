// Newline-delimited line framing over TCP.
//
// Every unit of communication in both directions is one UTF-8 text line ended
// by `\n`. There is no length prefix and no escaping, so a message body can
// never contain a line break. `write_line` rejects such a body instead of
// silently splitting it in two. `read_line` strips the terminator, accepting
// `\r\n` as well. Invalid UTF-8 is decoded lossily rather than dropping the
// connection.
//
// Lines are capped at a caller-supplied maximum (`DEFAULT_MAX_LINE_BYTES`
// unless configured) so a peer that never sends a newline cannot make the
// reader buffer grow without bound. Pass `usize::MAX` to read uncapped.

use std::io::{self, BufRead, Read, Write};

/// Default upper bound on a single inbound line, excluding the terminator.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Write `line` followed by `\n`, then flush.
pub fn write_line<W: Write>(writer: &mut W, line: &str) -> io::Result<()> {
    if line.contains('\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "line must not contain a line break",
        ));
    }
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read one line, without its terminator.
///
/// Returns `Ok(None)` on a clean EOF before any byte of a new line. A final
/// unterminated line is returned as-is. Returns `InvalidData` if the line is
/// longer than `max_bytes`.
pub fn read_line<R: BufRead>(reader: &mut R, max_bytes: usize) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let read = Read::take(&mut *reader, limit).read_until(b'\n', &mut buf)?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line too long (max {max_bytes} bytes)"),
        ));
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
