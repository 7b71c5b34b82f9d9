//! Peer transport seam.
//!
//! A transport discovers nearby devices, maintains one encrypted session and
//! moves control messages and whole files across it. All of its callbacks
//! are delivered through a [`TransportSink`] stamped with the attempt epoch
//! that created it, so events from an abandoned attempt are recognisable.

use crate::error::PairingResult;
use crate::session::Envelope;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Opaque identity of a remote device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a transport can report.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Browsing found a device advertising the service.
    PeerFound(PeerId),
    PeerLost(PeerId),
    /// A browsing device asked to connect.
    InvitationReceived(PeerId),
    Connecting(PeerId),
    Connected(PeerId),
    Disconnected(PeerId),
    Data { from: PeerId, bytes: Vec<u8> },
    ResourceStarted { from: PeerId, name: String },
    ResourceProgress { from: PeerId, fraction: f64 },
    /// A file finished arriving. `Ok` holds a temporary location the
    /// receiver is expected to move out of.
    ResourceFinished {
        from: PeerId,
        name: String,
        result: Result<PathBuf, String>,
    },
    /// Advertising or browsing could not start.
    StartFailed(String),
}

/// Epoch-tagged channel back into the pairing session.
#[derive(Clone)]
pub struct TransportSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl TransportSink {
    pub(crate) fn new(epoch: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Delivers an event. Returns `false` once the session has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Envelope::Transport {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSink").field("epoch", &self.epoch).finish()
    }
}

/// Progress callback for an outgoing file, in `0.0..=1.0`.
pub type SendProgress = Box<dyn Fn(f64) + Send + Sync>;

/// Nearby-device session transport.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Starts advertising `service` and accepting invitations.
    async fn advertise(&self, service: &str, sink: TransportSink) -> PairingResult<()>;

    /// Starts browsing for devices advertising `service`.
    async fn browse(&self, service: &str, sink: TransportSink) -> PairingResult<()>;

    /// Asks a discovered peer to join the session.
    async fn invite(&self, peer: &PeerId) -> PairingResult<()>;

    /// Accepts a pending invitation.
    async fn accept(&self, peer: &PeerId) -> PairingResult<()>;

    /// Sends one reliable control message.
    async fn send(&self, peer: &PeerId, bytes: Vec<u8>) -> PairingResult<()>;

    /// Streams a file to `peer` under `name`. Resolves once the peer has the
    /// whole file.
    async fn send_resource(
        &self,
        peer: &PeerId,
        path: &Path,
        name: &str,
        progress: SendProgress,
    ) -> PairingResult<()>;

    /// Stops advertising and browsing and drops any session.
    async fn disconnect(&self);
}
