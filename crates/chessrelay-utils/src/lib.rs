pub mod arrayvec;
mod assert;

pub use arrayvec::ArrayVec;
