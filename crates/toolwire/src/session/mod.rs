//! Session phase state machine.

pub mod state;

pub use state::{transition, Direction, Event, PeerCapabilities, Phase, Role, Session};
