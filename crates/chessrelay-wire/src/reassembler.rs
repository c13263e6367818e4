//! Byte-stream reassembly: turns an arbitrarily-chunked stream of socket
//! reads back into discrete frames, one header-then-payload state machine
//! per connection.

use chessrelay_utils::ArrayVec;

use crate::message::{self, DecodeError, Frame, HEADER_SIZE, MAX_FRAME_SIZE};

/// Capacity of a connection's reassembly buffer: enough slack to hold a
/// full frame plus a further 128 bytes of whatever arrives behind it in
/// the same `read()`, so a burst of several small frames queued up by the
/// peer never forces a short read to be split across calls.
pub const BUFFER_CAPACITY: usize = 128 + MAX_FRAME_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("peer sent more bytes than the reassembly buffer can hold")]
    Overflow,
}

/// Accumulates bytes fed from a non-blocking socket read and yields
/// complete frames as soon as enough bytes have arrived, however the
/// underlying reads happened to be chunked.
///
/// Mirrors a header-then-payload state machine: once two header bytes are
/// buffered the declared `total_size` is known, and `frame_ready` compares
/// the buffered length against it directly rather than tracking a separate
/// phase enum, since `total_size` is always small and known up front.
#[derive(Debug, Default)]
pub struct Reassembler {
    buf: ArrayVec<u8, BUFFER_CAPACITY>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self { buf: ArrayVec::new() }
    }

    /// Spare capacity remaining in the buffer. The caller should never read
    /// more bytes off the socket than this in one call, or the reassembler
    /// would have to split a single `read()` result between a completed
    /// frame and the next one.
    pub fn remaining_capacity(&self) -> usize {
        self.buf.capacity() - self.buf.len()
    }

    /// Appends newly-read bytes to the buffer.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), FeedError> {
        if !self.buf.try_extend_from_slice(bytes) {
            return Err(FeedError::Overflow);
        }
        Ok(())
    }

    /// Whether a complete frame is sitting at the front of the buffer.
    pub fn frame_ready(&self) -> bool {
        if self.buf.len() < HEADER_SIZE {
            return false;
        }
        let declared_size = self.buf[1] as usize;
        self.buf.len() >= declared_size
    }

    /// Decodes and removes the frame at the front of the buffer, shifting
    /// any trailing bytes (the start of the next frame) down to index 0.
    /// Returns `Ok(None)` if a full frame isn't buffered yet.
    pub fn take_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        if !self.frame_ready() {
            return Ok(None);
        }
        let declared_size = self.buf[1] as usize;
        let frame = message::decode(&self.buf.as_slice()[..declared_size])?;
        self.buf.drain_front(declared_size);
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{self as msg, MessageType};

    #[test]
    fn assembles_across_arbitrary_chunk_boundaries() {
        let frame = msg::encode_pair_request(7);
        let bytes = frame.as_bytes();

        // Feed one byte at a time; only once all 6 bytes have arrived
        // should a frame be ready.
        let mut r = Reassembler::new();
        for (i, &b) in bytes.iter().enumerate() {
            assert!(r.take_frame().unwrap().is_none());
            r.feed(&[b]).unwrap();
            if i + 1 < bytes.len() {
                assert!(!r.frame_ready());
            }
        }
        let decoded = r.take_frame().unwrap().expect("frame should be complete");
        assert_eq!(decoded.msg_type(), MessageType::PairRequest);
    }

    #[test]
    fn keeps_trailing_bytes_of_the_next_frame() {
        let a = msg::encode_resign();
        let b = msg::encode_pair_request(42);

        let mut combined = Vec::new();
        combined.extend_from_slice(a.as_bytes());
        combined.extend_from_slice(b.as_bytes());

        let mut r = Reassembler::new();
        r.feed(&combined).unwrap();

        let first = r.take_frame().unwrap().unwrap();
        assert_eq!(first.msg_type(), MessageType::Resign);

        let second = r.take_frame().unwrap().unwrap();
        assert_eq!(second.msg_type(), MessageType::PairRequest);
        assert_eq!(msg::frame_peer_id(&second), Some(42));
    }

    #[test]
    fn rejects_malformed_header_without_desyncing() {
        let mut r = Reassembler::new();
        // Unknown type byte, size byte claims 2.
        r.feed(&[250, 2]).unwrap();
        assert!(matches!(r.take_frame(), Err(DecodeError::UnknownType(250))));
    }

    #[test]
    fn overflow_is_reported() {
        let mut r = Reassembler::new();
        let err = r.feed(&[0u8; BUFFER_CAPACITY + 1]).unwrap_err();
        assert!(matches!(err, FeedError::Overflow));
    }

    #[test]
    fn holds_a_full_frame_plus_128_bytes_of_slack() {
        let r = Reassembler::new();
        assert!(r.remaining_capacity() >= 128 + MAX_FRAME_SIZE);
    }
}
