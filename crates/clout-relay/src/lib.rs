//! Mediation server (§4.7): a minimal hub clients connect to for
//! challenge-response authenticated signaling and forwarding. It never
//! sees gossip payload contents beyond what routing needs.

pub mod config;
pub mod protocol;
pub mod server;
pub mod session;

pub use config::RelayConfig;
pub use protocol::{RelayMessage, RelayMessageKind};
pub use server::RelayServer;
