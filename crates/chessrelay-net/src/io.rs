use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

/// Outcome of a single non-blocking read attempt.
pub enum ReadOutcome {
    /// `n` bytes were read into the caller's buffer.
    Data(usize),
    /// The socket has no data ready right now; try again later.
    WouldBlock,
    /// The peer closed its half of the connection (`read` returned 0).
    Closed,
}

/// Performs one non-blocking read attempt, classifying the result. Never
/// loops: a readiness-driven caller should call this once per readable
/// event and come back to the poll loop afterwards.
pub fn read_nonblocking(stream: &mut impl Read, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    loop {
        match stream.read(buf) {
            Ok(0) => return Ok(ReadOutcome::Closed),
            Ok(n) => return Ok(ReadOutcome::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadOutcome::WouldBlock),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Writes every byte of `buf`, retrying on `WouldBlock` with a short sleep
/// instead of busy-spinning. These frames are a handful of bytes each, so a
/// full backlog/reregister-for-writable apparatus would be disproportionate;
/// a short backoff loop keeps the same "every byte gets written or the
/// caller hears about it" contract without one.
pub fn send_all(stream: &mut impl Write, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match stream.write(buf) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "wrote zero bytes")),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_micros(50));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    #[test]
    fn send_all_writes_everything_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let writer = thread::spawn(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            send_all(&mut client, b"hello, reassembler").unwrap();
        });

        let (mut server_side, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        server_side.read_to_end(&mut received).unwrap();
        writer.join().unwrap();

        assert_eq!(received, b"hello, reassembler");
    }

    #[test]
    fn read_nonblocking_reports_would_block() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).unwrap();
        let (mut server_side, _) = listener.accept().unwrap();
        server_side.set_nonblocking(true).unwrap();

        let mut buf = [0u8; 16];
        match read_nonblocking(&mut server_side, &mut buf).unwrap() {
            ReadOutcome::WouldBlock => {}
            _ => panic!("expected WouldBlock with nothing written yet"),
        }
    }
}
