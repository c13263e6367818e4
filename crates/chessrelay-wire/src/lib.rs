pub mod message;
pub mod reassembler;

pub use message::{decode, DecodeError, Frame, MessageType, Side, HEADER_SIZE, MAX_FRAME_SIZE};
pub use reassembler::{FeedError, Reassembler, BUFFER_CAPACITY};
