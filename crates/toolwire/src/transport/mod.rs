//! Newline-delimited framing and the duplex channel it runs over.

pub mod channel;
pub mod framing;

pub use channel::{Channel, FrameReader, FrameWriter, PeerProcess, ServerCommand};
pub use framing::{decode, encode};
