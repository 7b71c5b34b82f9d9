//! Pure pairing state machine.
//!
//! [`PairingMachine::handle`] consumes one [`Input`] and returns the states
//! it passed through plus the side effects the caller must run, in order.
//! It never touches the transport, the file system or a clock; the session
//! actor does that and feeds the outcomes back in as further inputs.

use crate::error::{PairingError, PairingResult};
use crate::message::ControlMessage;
use crate::transport::PeerId;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    PinMismatch,
    ConnectionLost,
    /// Discovery or a control message could not be sent.
    Transport(String),
    TransferFailed(String),
    /// The received artifact could not be moved into the backups directory.
    StorageFailed(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::PinMismatch => f.write_str("PIN verification failed"),
            FailureReason::ConnectionLost => f.write_str("connection lost"),
            FailureReason::Transport(e) => write!(f, "transport error: {e}"),
            FailureReason::TransferFailed(e) => write!(f, "transfer failed: {e}"),
            FailureReason::StorageFailed(e) => write!(f, "could not save backup: {e}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum PairingState {
    #[default]
    Idle,
    WaitingForPeer,
    Connected,
    PinWaitingInput,
    PinVerifying,
    ReadyToTransfer,
    Transferring(f64),
    Completed,
    Failed(FailureReason),
}

impl PairingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PairingState::Completed | PairingState::Failed(_))
    }
}

impl fmt::Display for PairingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingState::Idle => f.write_str("idle"),
            PairingState::WaitingForPeer => f.write_str("waiting for peer"),
            PairingState::Connected => f.write_str("connected"),
            PairingState::PinWaitingInput => f.write_str("waiting for PIN input"),
            PairingState::PinVerifying => f.write_str("verifying PIN"),
            PairingState::ReadyToTransfer => f.write_str("ready to transfer"),
            PairingState::Transferring(p) => write!(f, "transferring ({:.0}%)", p * 100.0),
            PairingState::Completed => f.write_str("completed"),
            PairingState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Everything that can drive the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    StartReceiver { pin: String },
    StartSender { artifact: PathBuf },
    SubmitPin(String),
    Reset,

    PeerFound(PeerId),
    InvitationReceived(PeerId),
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    Message { from: PeerId, message: ControlMessage },
    ResourceStarted { from: PeerId, name: String },
    ResourceProgress { from: PeerId, fraction: f64 },
    ResourceFinished {
        from: PeerId,
        name: String,
        result: Result<PathBuf, String>,
    },
    TransportFailed(String),

    SendProgress(f64),
    SendFinished(Result<(), String>),
    ArtifactStored(Result<PathBuf, String>),
    FailureExpired { generation: u64 },
}

/// Work the session must perform after publishing a step's transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Advertise,
    Browse,
    Invite(PeerId),
    Accept(PeerId),
    Send { to: PeerId, message: ControlMessage },
    SendResource { to: PeerId, path: PathBuf, name: String },
    /// Move a received file into the backups directory under `name`.
    StoreArtifact { temp: PathBuf, name: String },
    /// Delete a file that arrived outside an authenticated transfer.
    Discard(PathBuf),
    Disconnect,
    ScheduleExpiry { generation: u64 },
}

/// Output of one [`PairingMachine::handle`] call.
#[derive(Debug, Default, PartialEq)]
pub struct Step {
    pub transitions: Vec<PairingState>,
    pub effects: Vec<Effect>,
}

impl Step {
    fn ignored() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.effects.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PairingMachine {
    state: PairingState,
    role: Option<Role>,
    peer: Option<PeerId>,
    invited: Option<PeerId>,
    expected_pin: Option<String>,
    artifact: Option<PathBuf>,
    artifact_received: bool,
    received_artifact: Option<PathBuf>,
    failure_generation: u64,
}

impl PairingMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PairingState {
        &self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn peer(&self) -> Option<&PeerId> {
        self.peer.as_ref()
    }

    /// Final location of the artifact this receiver stored.
    pub fn received_artifact(&self) -> Option<&PathBuf> {
        self.received_artifact.as_ref()
    }

    pub fn handle(&mut self, input: Input) -> PairingResult<Step> {
        let step = match input {
            Input::StartReceiver { pin } => self.start(Role::Receiver, Some(pin), None),
            Input::StartSender { artifact } => self.start(Role::Sender, None, Some(artifact)),
            Input::SubmitPin(pin) => return self.submit_pin(pin),
            Input::Reset => {
                self.clear();
                self.step_to(PairingState::Idle)
            }
            Input::PeerFound(peer) => self.on_peer_found(peer),
            Input::InvitationReceived(peer) => self.on_invitation(peer),
            Input::PeerConnected(peer) => self.on_connected(peer),
            Input::PeerDisconnected(peer) => self.on_disconnected(peer),
            Input::Message { from, message } => self.on_message(from, message),
            Input::ResourceStarted { from, name } => self.on_resource_started(from, name),
            Input::ResourceProgress { from, fraction } => {
                if self.is_connected_peer(&from) && self.role == Some(Role::Receiver) {
                    self.advance_transfer(fraction)
                } else {
                    Step::ignored()
                }
            }
            Input::ResourceFinished { from, name, result } => {
                self.on_resource_finished(from, name, result)
            }
            Input::TransportFailed(e) => {
                if self.role.is_none() || self.state.is_terminal() {
                    Step::ignored()
                } else {
                    self.fail(FailureReason::Transport(e))
                }
            }
            Input::SendProgress(fraction) => {
                if self.role == Some(Role::Sender) {
                    self.advance_transfer(fraction)
                } else {
                    Step::ignored()
                }
            }
            Input::SendFinished(result) => self.on_send_finished(result),
            Input::ArtifactStored(result) => self.on_artifact_stored(result),
            Input::FailureExpired { generation } => {
                if matches!(self.state, PairingState::Failed(_))
                    && generation == self.failure_generation
                {
                    self.clear();
                    self.step_to(PairingState::Idle)
                } else {
                    Step::ignored()
                }
            }
        };
        Ok(step)
    }

    fn start(&mut self, role: Role, pin: Option<String>, artifact: Option<PathBuf>) -> Step {
        self.clear();
        self.role = Some(role);
        self.expected_pin = pin;
        self.artifact = artifact;
        let mut step = self.step_to(PairingState::WaitingForPeer);
        step.effects.push(match role {
            Role::Receiver => Effect::Advertise,
            Role::Sender => Effect::Browse,
        });
        step
    }

    fn submit_pin(&mut self, pin: String) -> PairingResult<Step> {
        if self.role != Some(Role::Sender) || self.state != PairingState::PinWaitingInput {
            return Err(PairingError::InvalidState {
                action: "submitting a PIN",
                state: self.state.to_string(),
            });
        }
        let pin = pin.trim();
        if pin.is_empty() {
            return Err(PairingError::EmptyPin);
        }
        let Some(peer) = self.peer.clone() else {
            return Err(PairingError::InvalidState {
                action: "submitting a PIN",
                state: "no connected peer".to_string(),
            });
        };
        let mut step = self.step_to(PairingState::PinVerifying);
        step.effects.push(Effect::Send {
            to: peer,
            message: ControlMessage::auth_pin(pin),
        });
        Ok(step)
    }

    fn on_peer_found(&mut self, peer: PeerId) -> Step {
        if self.role != Some(Role::Sender)
            || self.state != PairingState::WaitingForPeer
            || self.invited.is_some()
        {
            return Step::ignored();
        }
        self.invited = Some(peer.clone());
        Step {
            transitions: Vec::new(),
            effects: vec![Effect::Invite(peer)],
        }
    }

    fn on_invitation(&mut self, peer: PeerId) -> Step {
        if self.role != Some(Role::Receiver)
            || self.state != PairingState::WaitingForPeer
            || self.invited.is_some()
        {
            debug!("declining invitation from {peer} while {}", self.state);
            return Step::ignored();
        }
        self.invited = Some(peer.clone());
        Step {
            transitions: Vec::new(),
            effects: vec![Effect::Accept(peer)],
        }
    }

    fn on_connected(&mut self, peer: PeerId) -> Step {
        let Some(role) = self.role else {
            return Step::ignored();
        };
        if self.state != PairingState::WaitingForPeer || self.peer.is_some() {
            return Step::ignored();
        }
        if let Some(invited) = &self.invited
            && *invited != peer
        {
            return Step::ignored();
        }
        self.peer = Some(peer);
        let mut step = self.step_to(PairingState::Connected);
        if role == Role::Sender {
            step.transitions.push(PairingState::PinWaitingInput);
            self.state = PairingState::PinWaitingInput;
        }
        step
    }

    fn on_disconnected(&mut self, peer: PeerId) -> Step {
        if !self.is_connected_peer(&peer) || self.artifact_received || self.state.is_terminal() {
            return Step::ignored();
        }
        // Every byte is out; the send completion decides the outcome.
        if self.role == Some(Role::Sender) && self.state == PairingState::Transferring(1.0) {
            return Step::ignored();
        }
        self.fail(FailureReason::ConnectionLost)
    }

    fn on_message(&mut self, from: PeerId, message: ControlMessage) -> Step {
        if !self.is_connected_peer(&from) {
            return Step::ignored();
        }
        match (self.role, self.state.clone(), message) {
            (Some(Role::Receiver), PairingState::Connected, ControlMessage::AuthPin(claim)) => {
                let expected = self.expected_pin.as_deref().unwrap_or_default();
                if pin_matches(expected, claim.pin.trim()) {
                    let mut step = self.step_to(PairingState::ReadyToTransfer);
                    step.effects.push(Effect::Send {
                        to: from,
                        message: ControlMessage::AuthPinSuccess,
                    });
                    step
                } else {
                    let mut step = Step {
                        transitions: Vec::new(),
                        effects: vec![Effect::Send {
                            to: from,
                            message: ControlMessage::AuthPinRejected,
                        }],
                    };
                    let failed = self.fail(FailureReason::PinMismatch);
                    step.transitions.extend(failed.transitions);
                    step.effects.extend(failed.effects);
                    step
                }
            }
            (Some(Role::Sender), PairingState::PinVerifying, ControlMessage::AuthPinSuccess) => {
                let Some(path) = self.artifact.clone() else {
                    return self.fail(FailureReason::TransferFailed("no artifact selected".into()));
                };
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mut step = self.step_to(PairingState::ReadyToTransfer);
                step.transitions.push(PairingState::Transferring(0.0));
                self.state = PairingState::Transferring(0.0);
                step.effects.push(Effect::SendResource {
                    to: from,
                    path,
                    name,
                });
                step
            }
            (Some(Role::Sender), PairingState::PinVerifying, ControlMessage::AuthPinRejected) => {
                self.fail(FailureReason::PinMismatch)
            }
            (_, state, message) => {
                debug!("ignoring {message:?} while {state}");
                Step::ignored()
            }
        }
    }

    fn on_resource_started(&mut self, from: PeerId, name: String) -> Step {
        if self.role != Some(Role::Receiver)
            || !self.is_connected_peer(&from)
            || self.state != PairingState::ReadyToTransfer
        {
            debug!("resource {name} offered before verification; it will be discarded");
            return Step::ignored();
        }
        self.step_to(PairingState::Transferring(0.0))
    }

    fn on_resource_finished(
        &mut self,
        from: PeerId,
        name: String,
        result: Result<PathBuf, String>,
    ) -> Step {
        let accepted = self.role == Some(Role::Receiver)
            && self.is_connected_peer(&from)
            && matches!(self.state, PairingState::Transferring(_));
        match (accepted, result) {
            (true, Ok(temp)) => {
                self.artifact_received = true;
                let mut step = self.advance_transfer(1.0);
                step.effects.push(Effect::StoreArtifact { temp, name });
                step
            }
            (true, Err(e)) => self.fail(FailureReason::TransferFailed(e)),
            (false, Ok(temp)) => Step {
                transitions: Vec::new(),
                effects: vec![Effect::Discard(temp)],
            },
            (false, Err(_)) => Step::ignored(),
        }
    }

    fn on_send_finished(&mut self, result: Result<(), String>) -> Step {
        if self.role != Some(Role::Sender) || !matches!(self.state, PairingState::Transferring(_))
        {
            return Step::ignored();
        }
        match result {
            Ok(()) => {
                let mut step = self.advance_transfer(1.0);
                step.transitions.push(PairingState::Completed);
                self.state = PairingState::Completed;
                step.effects.push(Effect::Disconnect);
                step
            }
            Err(e) => self.fail(FailureReason::TransferFailed(e)),
        }
    }

    fn on_artifact_stored(&mut self, result: Result<PathBuf, String>) -> Step {
        if self.role != Some(Role::Receiver) || !self.artifact_received || self.state.is_terminal()
        {
            return Step::ignored();
        }
        match result {
            Ok(path) => {
                self.received_artifact = Some(path);
                let mut step = self.step_to(PairingState::Completed);
                step.effects.push(Effect::Disconnect);
                step
            }
            Err(e) => self.fail(FailureReason::StorageFailed(e)),
        }
    }

    /// Moves `Transferring` forward; never backwards and never past 1.0.
    fn advance_transfer(&mut self, fraction: f64) -> Step {
        let PairingState::Transferring(current) = self.state else {
            return Step::ignored();
        };
        let next = fraction.clamp(0.0, 1.0);
        if next <= current {
            return Step::ignored();
        }
        self.step_to(PairingState::Transferring(next))
    }

    fn fail(&mut self, reason: FailureReason) -> Step {
        self.failure_generation += 1;
        let generation = self.failure_generation;
        let mut step = self.step_to(PairingState::Failed(reason));
        step.effects.push(Effect::Disconnect);
        step.effects.push(Effect::ScheduleExpiry { generation });
        step
    }

    fn step_to(&mut self, state: PairingState) -> Step {
        self.state = state.clone();
        Step {
            transitions: vec![state],
            effects: Vec::new(),
        }
    }

    fn is_connected_peer(&self, peer: &PeerId) -> bool {
        self.peer.as_ref() == Some(peer)
    }

    fn clear(&mut self) {
        let generation = self.failure_generation;
        *self = Self {
            failure_generation: generation,
            ..Self::default()
        };
    }
}

/// Compares PINs without an early exit on the first differing byte.
fn pin_matches(expected: &str, claimed: &str) -> bool {
    let (a, b) = (expected.as_bytes(), claimed.as_bytes());
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
