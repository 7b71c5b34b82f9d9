//! PIN-authenticated pairing and artifact transfer between two devices.
//!
//! The receiving (new) device advertises and shows a short numeric PIN; the
//! sending (old) device browses, connects, and sends the PIN the user typed.
//! Only after the receiver confirms it does the sender stream the sealed
//! backup artifact, which the receiver moves into its backups directory.
//!
//! [`machine`] holds the pure transition logic, [`session`] runs it as a
//! single tokio task against a [`PeerTransport`].

pub mod config;
mod error;
pub mod machine;
pub mod message;
pub mod session;
pub mod transport;

pub use config::PairingConfig;
pub use error::{PairingError, PairingResult};
pub use machine::{FailureReason, PairingMachine, PairingState, Role};
pub use message::ControlMessage;
pub use session::{PairingHandle, spawn_session};
pub use transport::{PeerId, PeerTransport, SendProgress, TransportEvent, TransportSink};
