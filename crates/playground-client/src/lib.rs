//! Terminal client for the playground relay.
//!
//! Polls relay status and the active session's event log, folding newly
//! seen events into a local conversation view.

pub mod api;
pub mod config;
pub mod error;
pub mod poller;
pub mod render;

pub use api::{HttpRelayApi, RelayApi};
pub use error::ClientError;
pub use poller::{ClientState, Command, PlaygroundClient, SessionDefaults, ViewUpdate};
pub use render::{TerminalView, View};
