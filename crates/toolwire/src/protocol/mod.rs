//! JSON-RPC correlation and the server-role dispatcher.

pub mod correlator;
pub mod handler;
pub mod negotiation;
pub mod validator;

pub use correlator::{Correlator, MessageHandler};
pub use handler::ProtocolHandler;
pub use negotiation::NegotiatedCapabilities;
