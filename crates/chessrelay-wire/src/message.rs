//! Message types, their fixed wire sizes, and frame encode/decode.
//!
//! Every message on the wire starts with a two byte header: the first byte
//! is the [`MessageType`], the second is the total size in bytes of the
//! whole message (header included). The table below is exhaustive and
//! fixed; there is no variable-length message in this protocol.

use chessrelay_utils::ArrayVec;

/// Largest `total_size` of any message (`Move`).
pub const MAX_FRAME_SIZE: usize = 10;
/// Size of the type+size header shared by every message.
pub const HEADER_SIZE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Move = 1,
    Resign = 2,
    DrawOffer = 3,
    DrawAccept = 4,
    DrawDecline = 5,
    RematchRequest = 6,
    RematchAccept = 7,
    PairingComplete = 8,
    PairRequest = 9,
    PairAccept = 10,
    PairDecline = 11,
    PairNoResponse = 12,
    ServerFull = 13,
    IdNotInLobby = 14,
    Unpair = 15,
    OpponentClosedConnection = 16,
    RematchDecline = 17,
    PairRequestTooSoon = 18,
    NewId = 19,
}

impl MessageType {
    pub const fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            1 => Self::Move,
            2 => Self::Resign,
            3 => Self::DrawOffer,
            4 => Self::DrawAccept,
            5 => Self::DrawDecline,
            6 => Self::RematchRequest,
            7 => Self::RematchAccept,
            8 => Self::PairingComplete,
            9 => Self::PairRequest,
            10 => Self::PairAccept,
            11 => Self::PairDecline,
            12 => Self::PairNoResponse,
            13 => Self::ServerFull,
            14 => Self::IdNotInLobby,
            15 => Self::Unpair,
            16 => Self::OpponentClosedConnection,
            17 => Self::RematchDecline,
            18 => Self::PairRequestTooSoon,
            19 => Self::NewId,
            _ => return None,
        })
    }

    /// The total size (header included) that every frame of this type must
    /// carry on the wire. Fixed per type, never negotiated.
    pub const fn total_size(self) -> u8 {
        match self {
            Self::Move => 10,
            Self::Resign
            | Self::DrawOffer
            | Self::DrawAccept
            | Self::DrawDecline
            | Self::RematchRequest
            | Self::RematchAccept
            | Self::PairNoResponse
            | Self::ServerFull
            | Self::Unpair
            | Self::OpponentClosedConnection
            | Self::RematchDecline
            | Self::PairRequestTooSoon => 2,
            Self::PairingComplete => 3,
            Self::PairRequest | Self::PairAccept | Self::PairDecline | Self::IdNotInLobby | Self::NewId => 6,
        }
    }

    /// Whether this type is ever legal to receive while a connection is
    /// sitting in the lobby (as opposed to inside a game).
    pub const fn is_lobby_legal(self) -> bool {
        matches!(self, Self::PairRequest | Self::PairAccept | Self::PairDecline)
    }

    /// Whether this type is ever legal to receive while a connection is
    /// paired into a game.
    pub const fn is_game_legal(self) -> bool {
        matches!(
            self,
            Self::Move
                | Self::Resign
                | Self::DrawOffer
                | Self::DrawAccept
                | Self::DrawDecline
                | Self::RematchRequest
                | Self::RematchAccept
                | Self::RematchDecline
                | Self::Unpair
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Side {
    White = 1,
    Black = 2,
}

impl Side {
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::White),
            2 => Some(Self::Black),
            _ => None,
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown message type byte {0}")]
    UnknownType(u8),
    #[error("message type {msg_type:?} declares size {declared} but must be {expected}")]
    SizeMismatch { msg_type: MessageType, declared: u8, expected: u8 },
    #[error("frame too short to contain a header")]
    Truncated,
}

/// A complete, on-the-wire frame: header plus payload, never longer than
/// [`MAX_FRAME_SIZE`] bytes. Stack-allocated, `Copy`, byte-faithful.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    bytes: ArrayVec<u8, MAX_FRAME_SIZE>,
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub fn msg_type(&self) -> MessageType {
        MessageType::from_byte(self.bytes[0]).expect("Frame is only ever built with a valid type")
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes.as_slice()[HEADER_SIZE..]
    }

    fn from_validated(bytes: &[u8]) -> Self {
        let mut v = ArrayVec::new();
        assert!(v.try_extend_from_slice(bytes), "frame exceeds MAX_FRAME_SIZE");
        Self { bytes: v }
    }
}

/// Decodes and validates a single frame out of a byte slice whose length
/// is exactly the frame's declared `total_size` (the reassembler is
/// responsible for slicing the stream up to that boundary before calling
/// this). Total function: never panics on attacker-controlled input.
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::Truncated);
    }
    let msg_type = MessageType::from_byte(bytes[0]).ok_or(DecodeError::UnknownType(bytes[0]))?;
    let expected = msg_type.total_size();
    if bytes.len() as u8 != expected || bytes[1] != expected {
        return Err(DecodeError::SizeMismatch { msg_type, declared: bytes[1], expected });
    }
    Ok(Frame::from_validated(bytes))
}

/// Extracts the big-endian `u32` identifier carried by `PAIR_REQUEST`,
/// `PAIR_ACCEPT`, `PAIR_DECLINE`, `ID_NOT_IN_LOBBY`, and `NEW_ID` frames.
/// Returns `None` for any other message type.
pub fn frame_peer_id(frame: &Frame) -> Option<u32> {
    match frame.msg_type() {
        MessageType::PairRequest
        | MessageType::PairAccept
        | MessageType::PairDecline
        | MessageType::IdNotInLobby
        | MessageType::NewId => {
            let p = frame.payload();
            Some(u32::from_be_bytes([p[0], p[1], p[2], p[3]]))
        }
        _ => None,
    }
}

/// Extracts the [`Side`] carried by a `PairingComplete` frame.
pub fn frame_side(frame: &Frame) -> Option<Side> {
    match frame.msg_type() {
        MessageType::PairingComplete => Side::from_byte(frame.payload()[0]),
        _ => None,
    }
}

fn encode_header_only(msg_type: MessageType) -> Frame {
    let size = msg_type.total_size();
    debug_assert_eq!(size, 2, "encode_header_only used on a message carrying a payload");
    Frame::from_validated(&[msg_type as u8, size])
}

fn encode_with_id(msg_type: MessageType, id: u32) -> Frame {
    let size = msg_type.total_size();
    debug_assert_eq!(size, 6, "encode_with_id used on a message not carrying a u32 id");
    let id_be = id.to_be_bytes();
    Frame::from_validated(&[msg_type as u8, size, id_be[0], id_be[1], id_be[2], id_be[3]])
}

pub fn encode_resign() -> Frame {
    encode_header_only(MessageType::Resign)
}

pub fn encode_draw_offer() -> Frame {
    encode_header_only(MessageType::DrawOffer)
}

pub fn encode_draw_accept() -> Frame {
    encode_header_only(MessageType::DrawAccept)
}

pub fn encode_draw_decline() -> Frame {
    encode_header_only(MessageType::DrawDecline)
}

pub fn encode_rematch_request() -> Frame {
    encode_header_only(MessageType::RematchRequest)
}

pub fn encode_rematch_accept() -> Frame {
    encode_header_only(MessageType::RematchAccept)
}

pub fn encode_rematch_decline() -> Frame {
    encode_header_only(MessageType::RematchDecline)
}

pub fn encode_unpair() -> Frame {
    encode_header_only(MessageType::Unpair)
}

pub fn encode_opponent_closed_connection() -> Frame {
    encode_header_only(MessageType::OpponentClosedConnection)
}

pub fn encode_pair_no_response() -> Frame {
    encode_header_only(MessageType::PairNoResponse)
}

pub fn encode_server_full() -> Frame {
    encode_header_only(MessageType::ServerFull)
}

pub fn encode_pair_request_too_soon() -> Frame {
    encode_header_only(MessageType::PairRequestTooSoon)
}

pub fn encode_pair_request(requester_or_target_id: u32) -> Frame {
    encode_with_id(MessageType::PairRequest, requester_or_target_id)
}

pub fn encode_pair_accept(peer_id: u32) -> Frame {
    encode_with_id(MessageType::PairAccept, peer_id)
}

pub fn encode_pair_decline(peer_id: u32) -> Frame {
    encode_with_id(MessageType::PairDecline, peer_id)
}

pub fn encode_id_not_in_lobby(invalid_id: u32) -> Frame {
    encode_with_id(MessageType::IdNotInLobby, invalid_id)
}

pub fn encode_new_id(id: u32) -> Frame {
    encode_with_id(MessageType::NewId, id)
}

pub fn encode_pairing_complete(side: Side) -> Frame {
    Frame::from_validated(&[MessageType::PairingComplete as u8, 3, side as u8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_only() {
        let f = encode_resign();
        let d = decode(f.as_bytes()).unwrap();
        assert_eq!(d.msg_type(), MessageType::Resign);
        assert_eq!(d.as_bytes(), f.as_bytes());
    }

    #[test]
    fn round_trips_id_message() {
        let f = encode_pair_request(0xDEAD_BEEF);
        let d = decode(f.as_bytes()).unwrap();
        assert_eq!(d.msg_type(), MessageType::PairRequest);
        assert_eq!(frame_peer_id(&d), Some(0xDEAD_BEEF));
    }

    #[test]
    fn round_trips_pairing_complete() {
        let f = encode_pairing_complete(Side::Black);
        let d = decode(f.as_bytes()).unwrap();
        assert_eq!(frame_side(&d), Some(Side::Black));
    }

    #[test]
    fn rejects_unknown_type() {
        let bytes = [200u8, 2];
        assert!(matches!(decode(&bytes), Err(DecodeError::UnknownType(200))));
    }

    #[test]
    fn rejects_size_mismatch() {
        // Resign's header claims size 5, but Resign is always exactly 2.
        let bytes = [MessageType::Resign as u8, 5, 0, 0, 0];
        assert!(matches!(decode(&bytes), Err(DecodeError::SizeMismatch { .. })));
    }

    #[test]
    fn rejects_truncated() {
        assert!(matches!(decode(&[9]), Err(DecodeError::Truncated)));
    }

    #[test]
    fn move_is_not_lobby_legal_and_pair_request_is() {
        assert!(!MessageType::Move.is_lobby_legal());
        assert!(MessageType::PairRequest.is_lobby_legal());
        assert!(MessageType::Move.is_game_legal());
        assert!(!MessageType::PairRequest.is_game_legal());
    }
}
