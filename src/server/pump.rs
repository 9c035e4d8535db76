//! Chunked read and write over a single client socket.

use mio::net::TcpStream;

use socket2::SockRef;

use std::io::{self, ErrorKind, Read, Write};

/// The outcome of draining a readable socket.
#[derive(Debug, PartialEq, Eq)]
pub enum Received {
    /// Some bytes arrived. `eof` is set if the peer closed its side right after them.
    Data { bytes: Vec<u8>, eof: bool },
    /// The peer closed the connection without sending anything more.
    Closed,
    /// The readiness was spurious, there was nothing to read.
    Nothing,
}

/// Receive up to `chunk_size` bytes at a time until a receive comes up short, the peer closes or
/// the socket has nothing more to give right now.
pub fn read<R: Read>(source: &mut R, chunk_size: usize) -> io::Result<Received> {
    let mut buffer = Vec::new();
    let mut chunk = vec![0; chunk_size];
    let mut eof = false;

    loop {
        match source.read(&mut chunk) {
            Ok(0) => {
                eof = true;
                break;
            }
            Ok(len) => {
                buffer.extend_from_slice(&chunk[..len]);
                if len < chunk_size {
                    break;
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }

    Ok(match (buffer.is_empty(), eof) {
        (true, true) => Received::Closed,
        (true, false) => Received::Nothing,
        (false, eof) => Received::Data { bytes: buffer, eof },
    })
}

/// Send all of `data`, at most `chunk_size` bytes per call, continuing from wherever the previous
/// send stopped. A send that accepts nothing is an error rather than a silent truncation.
pub fn write<W: Write>(sink: &mut W, data: &[u8], chunk_size: usize) -> io::Result<()> {
    let mut offset = 0;

    while offset < data.len() {
        let end = data.len().min(offset + chunk_size);
        match sink.write(&data[offset..end]) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    format!("peer stopped accepting data after {} bytes", offset),
                ))
            }
            Ok(len) => offset += len,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    sink.flush()
}

/// Write a reply to a client socket. The socket is put into blocking mode for the duration so
/// that a full send buffer waits instead of failing with `WouldBlock`.
pub fn send(stream: &mut TcpStream, data: &[u8], chunk_size: usize) -> io::Result<()> {
    SockRef::from(&*stream).set_nonblocking(false)?;
    let result = write(stream, data, chunk_size);
    let restored = SockRef::from(&*stream).set_nonblocking(true);
    settle(result, restored)
}

/// A failed write is what the caller needs to hear about, even when restoring the socket mode
/// failed as well.
fn settle(result: io::Result<()>, restored: io::Result<()>) -> io::Result<()> {
    match (result, restored) {
        (Err(e), Err(restore)) => {
            debug!("Could not restore non-blocking mode after a failed write: {}", restore);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), restored) => restored,
    }
}
