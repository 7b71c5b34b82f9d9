//! Pairing session actor.
//!
//! One tokio task owns the [`PairingMachine`]. Commands from
//! [`PairingHandle`], transport callbacks and completions of work the actor
//! started itself all arrive on a single unbounded queue and are handled in
//! order. Transport callbacks and internal completions carry the epoch of
//! the attempt that produced them; anything from an earlier attempt is
//! dropped.

use crate::config::PairingConfig;
use crate::error::{PairingError, PairingResult};
use crate::machine::{Effect, Input, PairingMachine, PairingState, Step};
use crate::message::ControlMessage;
use crate::transport::{PeerId, PeerTransport, SendProgress, TransportEvent, TransportSink};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

pub(crate) enum Envelope {
    Command(Command),
    Transport { epoch: u64, event: TransportEvent },
    Internal { epoch: u64, input: Input },
}

pub(crate) enum Command {
    StartReceiver(oneshot::Sender<PairingResult<String>>),
    StartSender {
        artifact: PathBuf,
        reply: oneshot::Sender<PairingResult<()>>,
    },
    SubmitPin {
        pin: String,
        reply: oneshot::Sender<PairingResult<()>>,
    },
    Reset(oneshot::Sender<()>),
    ReceivedArtifact(oneshot::Sender<Option<PathBuf>>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running pairing session.
#[derive(Clone)]
pub struct PairingHandle {
    tx: mpsc::UnboundedSender<Envelope>,
    state_rx: watch::Receiver<PairingState>,
    events_tx: broadcast::Sender<PairingState>,
}

impl PairingHandle {
    /// Resets, then waits for a sender as the receiving device. Returns the
    /// PIN to display.
    pub async fn start_receiver(&self) -> PairingResult<String> {
        self.request(Command::StartReceiver).await?
    }

    /// Resets, then looks for a receiver to send `artifact` to.
    pub async fn start_sender(&self, artifact: impl Into<PathBuf>) -> PairingResult<()> {
        let artifact = artifact.into();
        self.request(|reply| Command::StartSender { artifact, reply }).await?
    }

    /// Sends the PIN the user typed on the sending device.
    pub async fn submit_pin(&self, pin: &str) -> PairingResult<()> {
        let pin = pin.to_string();
        self.request(|reply| Command::SubmitPin { pin, reply }).await?
    }

    /// Tears the current attempt down and returns to `Idle`. Resolves once
    /// the transport has been released.
    pub async fn reset(&self) -> PairingResult<()> {
        self.request(Command::Reset).await
    }

    /// Where the last received artifact was stored, if any.
    pub async fn received_artifact(&self) -> PairingResult<Option<PathBuf>> {
        self.request(Command::ReceivedArtifact).await
    }

    /// Stops the session task after tearing down the transport.
    pub async fn shutdown(&self) -> PairingResult<()> {
        self.request(Command::Shutdown).await
    }

    /// Current state.
    pub fn state(&self) -> PairingState {
        self.state_rx.borrow().clone()
    }

    /// Latest-value view of the state.
    pub fn watch(&self) -> watch::Receiver<PairingState> {
        self.state_rx.clone()
    }

    /// Every transition, in order, from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PairingState> {
        self.events_tx.subscribe()
    }

    /// Waits until the current state satisfies `pred`.
    pub async fn wait_for(
        &self,
        pred: impl FnMut(&PairingState) -> bool,
    ) -> PairingResult<PairingState> {
        let mut rx = self.watch();
        let state = rx
            .wait_for(pred)
            .await
            .map_err(|_| PairingError::ChannelClosed)?;
        Ok(state.clone())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> PairingResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope::Command(build(reply)))
            .map_err(|_| PairingError::ChannelClosed)?;
        rx.await.map_err(|_| PairingError::ChannelClosed)
    }
}

/// Spawns a session actor on the current runtime.
pub fn spawn_session(
    transport: Arc<dyn PeerTransport>,
    config: PairingConfig,
) -> (PairingHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(PairingState::Idle);
    let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

    let session = PairingSession {
        machine: PairingMachine::new(),
        transport,
        config,
        epoch: 0,
        tx: tx.clone(),
        state_tx,
        events_tx: events_tx.clone(),
        transfer: None,
        expiry: None,
        transport_active: false,
    };
    let task = tokio::spawn(session.run(rx));

    (
        PairingHandle {
            tx,
            state_rx,
            events_tx,
        },
        task,
    )
}

struct PairingSession {
    machine: PairingMachine,
    transport: Arc<dyn PeerTransport>,
    config: PairingConfig,
    /// Attempt counter; bumped by every start and reset.
    epoch: u64,
    tx: mpsc::UnboundedSender<Envelope>,
    state_tx: watch::Sender<PairingState>,
    events_tx: broadcast::Sender<PairingState>,
    transfer: Option<JoinHandle<()>>,
    expiry: Option<JoinHandle<()>>,
    transport_active: bool,
}

impl PairingSession {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        info!("pairing session started (service {})", self.config.service_type);

        while let Some(envelope) = rx.recv().await {
            match envelope {
                Envelope::Command(Command::Shutdown(reply)) => {
                    self.begin_attempt().await;
                    let _ = reply.send(());
                    break;
                }
                Envelope::Command(cmd) => self.on_command(cmd).await,
                Envelope::Transport { epoch, event } => {
                    if epoch != self.epoch {
                        debug!("dropping stale transport event from attempt {epoch}: {event:?}");
                        if let TransportEvent::ResourceFinished { result: Ok(temp), .. } = event {
                            discard(&temp).await;
                        }
                        continue;
                    }
                    if let Some(input) = translate(event) {
                        self.dispatch(input).await;
                    }
                }
                Envelope::Internal { epoch, input } => {
                    if epoch == self.epoch {
                        self.dispatch(input).await;
                    }
                }
            }
        }

        info!("pairing session stopped");
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::StartReceiver(reply) => {
                self.begin_attempt().await;
                let pin = generate_pin(self.config.pin_digits);
                let result = self
                    .dispatch_checked(Input::StartReceiver { pin: pin.clone() })
                    .await
                    .map(|()| pin);
                let _ = reply.send(result);
            }
            Command::StartSender { artifact, reply } => {
                let result = match tokio::fs::metadata(&artifact).await {
                    Ok(_) => {
                        self.begin_attempt().await;
                        self.dispatch_checked(Input::StartSender { artifact }).await
                    }
                    Err(e) => Err(e.into()),
                };
                let _ = reply.send(result);
            }
            Command::SubmitPin { pin, reply } => {
                let _ = reply.send(self.dispatch_checked(Input::SubmitPin(pin)).await);
            }
            Command::Reset(reply) => {
                self.begin_attempt().await;
                self.dispatch(Input::Reset).await;
                let _ = reply.send(());
            }
            Command::ReceivedArtifact(reply) => {
                let _ = reply.send(self.machine.received_artifact().cloned());
            }
            Command::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    /// Releases everything the previous attempt held and opens a new epoch.
    async fn begin_attempt(&mut self) {
        if let Some(expiry) = self.expiry.take() {
            expiry.abort();
        }
        self.release_transport().await;
        self.epoch += 1;
        debug!("pairing attempt {} begins", self.epoch);
    }

    async fn release_transport(&mut self) {
        if let Some(transfer) = self.transfer.take() {
            transfer.abort();
        }
        if self.transport_active {
            self.transport.disconnect().await;
            self.transport_active = false;
        }
    }

    async fn dispatch(&mut self, input: Input) {
        if let Err(e) = self.dispatch_checked(input).await {
            warn!("pairing input rejected: {e}");
        }
    }

    async fn dispatch_checked(&mut self, input: Input) -> PairingResult<()> {
        let step = self.machine.handle(input)?;
        self.apply(step).await;
        Ok(())
    }

    async fn apply(&mut self, step: Step) {
        for state in step.transitions {
            info!("pairing state -> {state}");
            let _ = self.events_tx.send(state.clone());
            self.state_tx.send_replace(state);
        }
        for effect in step.effects {
            self.run_effect(effect).await;
        }
    }

    async fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Advertise => {
                self.transport_active = true;
                let sink = self.sink();
                if let Err(e) = self.transport.advertise(&self.config.service_type, sink).await {
                    self.feed(Input::TransportFailed(e.to_string()));
                }
            }
            Effect::Browse => {
                self.transport_active = true;
                let sink = self.sink();
                if let Err(e) = self.transport.browse(&self.config.service_type, sink).await {
                    self.feed(Input::TransportFailed(e.to_string()));
                }
            }
            Effect::Invite(peer) => {
                debug!("inviting {peer}");
                if let Err(e) = self.transport.invite(&peer).await {
                    self.feed(Input::TransportFailed(e.to_string()));
                }
            }
            Effect::Accept(peer) => {
                debug!("accepting invitation from {peer}");
                if let Err(e) = self.transport.accept(&peer).await {
                    self.feed(Input::TransportFailed(e.to_string()));
                }
            }
            Effect::Send { to, message } => {
                let sent = match message.encode() {
                    Ok(bytes) => self.transport.send(&to, bytes).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    self.feed(Input::TransportFailed(e.to_string()));
                }
            }
            Effect::SendResource { to, path, name } => self.start_transfer(to, path, name),
            Effect::StoreArtifact { temp, name } => {
                let result = store_artifact(&self.config.backups_dir, &temp, &name)
                    .await
                    .map_err(|e| e.to_string());
                match &result {
                    Ok(path) => info!("received backup stored at {}", path.display()),
                    Err(e) => {
                        warn!("could not store received backup {name}: {e}");
                        discard(&temp).await;
                    }
                }
                self.feed(Input::ArtifactStored(result));
            }
            Effect::Discard(temp) => discard(&temp).await,
            Effect::Disconnect => self.release_transport().await,
            Effect::ScheduleExpiry { generation } => {
                if let Some(previous) = self.expiry.take() {
                    previous.abort();
                }
                let tx = self.tx.clone();
                let epoch = self.epoch;
                let delay = self.config.failure_display();
                self.expiry = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Envelope::Internal {
                        epoch,
                        input: Input::FailureExpired { generation },
                    });
                }));
            }
        }
    }

    fn start_transfer(&mut self, to: PeerId, path: PathBuf, name: String) {
        info!("sending {name} to {to}");
        let transport = self.transport.clone();
        let tx = self.tx.clone();
        let epoch = self.epoch;

        let progress_tx = tx.clone();
        let progress: SendProgress = Box::new(move |fraction| {
            let _ = progress_tx.send(Envelope::Internal {
                epoch,
                input: Input::SendProgress(fraction),
            });
        });

        self.transfer = Some(tokio::spawn(async move {
            let result = transport
                .send_resource(&to, &path, &name, progress)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(Envelope::Internal {
                epoch,
                input: Input::SendFinished(result),
            });
        }));
    }

    fn sink(&self) -> TransportSink {
        TransportSink::new(self.epoch, self.tx.clone())
    }

    /// Queues a follow-up input behind whatever is already pending.
    fn feed(&self, input: Input) {
        let _ = self.tx.send(Envelope::Internal {
            epoch: self.epoch,
            input,
        });
    }
}

fn translate(event: TransportEvent) -> Option<Input> {
    match event {
        TransportEvent::PeerFound(peer) => Some(Input::PeerFound(peer)),
        TransportEvent::InvitationReceived(peer) => Some(Input::InvitationReceived(peer)),
        TransportEvent::Connected(peer) => Some(Input::PeerConnected(peer)),
        TransportEvent::Disconnected(peer) => Some(Input::PeerDisconnected(peer)),
        TransportEvent::PeerLost(peer) | TransportEvent::Connecting(peer) => {
            debug!("peer {peer} changed discovery state");
            None
        }
        TransportEvent::Data { from, bytes } => match ControlMessage::decode(&bytes) {
            Ok(message) => Some(Input::Message { from, message }),
            Err(e) => {
                warn!("ignoring undecodable control message from {from}: {e}");
                None
            }
        },
        TransportEvent::ResourceStarted { from, name } => {
            Some(Input::ResourceStarted { from, name })
        }
        TransportEvent::ResourceProgress { from, fraction } => {
            Some(Input::ResourceProgress { from, fraction })
        }
        TransportEvent::ResourceFinished { from, name, result } => {
            Some(Input::ResourceFinished { from, name, result })
        }
        TransportEvent::StartFailed(e) => Some(Input::TransportFailed(e)),
    }
}

/// Uniform random zero-padded numeric PIN.
fn generate_pin(digits: usize) -> String {
    let digits = digits.clamp(1, 9);
    let bound = 10u32.pow(digits as u32);
    let n = rand::thread_rng().gen_range(0..bound);
    format!("{n:0digits$}")
}

/// Moves a received file to `dir/name`, replacing any previous copy.
async fn store_artifact(dir: &Path, temp: &Path, name: &str) -> PairingResult<PathBuf> {
    let file_name = Path::new(name).file_name();
    if name.is_empty() || name.contains('\\') || file_name.is_none_or(|f| f != name) {
        return Err(PairingError::InvalidArtifactName(name.to_string()));
    }

    tokio::fs::create_dir_all(dir).await?;
    let target = dir.join(name);
    match tokio::fs::remove_file(&target).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }
    if tokio::fs::rename(temp, &target).await.is_err() {
        // Different file system: fall back to copy.
        tokio::fs::copy(temp, &target).await?;
        tokio::fs::remove_file(temp).await?;
    }
    Ok(target)
}

async fn discard(temp: &Path) {
    match tokio::fs::remove_file(temp).await {
        Ok(()) => debug!("discarded {}", temp.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not discard {}: {e}", temp.display()),
    }
}
