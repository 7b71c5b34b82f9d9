#![allow(dead_code)]

use async_trait::async_trait;
use keepsake_pairing::{
    PairingError, PairingHandle, PairingResult, PairingState, PeerId, PeerTransport,
    SendProgress, TransportEvent, TransportSink,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Loopback transport ──────────────────────────────────────────

#[derive(Default)]
struct Node {
    sink: Option<TransportSink>,
    advertising: Option<String>,
    browsing: Option<String>,
    pending_invite: Option<PeerId>,
    connected: Option<PeerId>,
}

/// Shared medium the loopback endpoints talk through.
struct Air {
    nodes: Mutex<HashMap<PeerId, Node>>,
    inbox: TempDir,
    received: AtomicUsize,
}

impl Air {
    fn emit(&self, to: &PeerId, event: TransportEvent) {
        let nodes = self.nodes.lock().unwrap();
        if let Some(sink) = nodes.get(to).and_then(|n| n.sink.as_ref()) {
            sink.emit(event);
        }
    }
}

/// In-process `PeerTransport`. Two endpoints created by [`pair`] can
/// discover each other, connect and exchange messages and files.
pub struct LoopbackTransport {
    me: PeerId,
    air: Arc<Air>,
    disconnects: AtomicUsize,
    sent: Mutex<Vec<Vec<u8>>>,
    resource_name: Mutex<Option<String>>,
}

/// Returns `(new_phone, old_phone)`.
pub fn pair() -> (Arc<LoopbackTransport>, Arc<LoopbackTransport>) {
    let air = Arc::new(Air {
        nodes: Mutex::new(HashMap::new()),
        inbox: tempfile::tempdir().unwrap(),
        received: AtomicUsize::new(0),
    });
    let endpoint = |name: &str| {
        let me = PeerId::new(name);
        air.nodes.lock().unwrap().insert(me.clone(), Node::default());
        Arc::new(LoopbackTransport {
            me,
            air: air.clone(),
            disconnects: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            resource_name: Mutex::new(None),
        })
    };
    (endpoint("new-phone"), endpoint("old-phone"))
}

impl LoopbackTransport {
    pub fn id(&self) -> PeerId {
        self.me.clone()
    }

    /// The sink handed over by the latest `advertise`/`browse`.
    pub fn sink(&self) -> Option<TransportSink> {
        self.air.nodes.lock().unwrap().get(&self.me).and_then(|n| n.sink.clone())
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Raw control messages this endpoint has sent.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Makes every later file transfer arrive under `name` instead of the
    /// name the session asked for.
    pub fn send_as(&self, name: &str) {
        *self.resource_name.lock().unwrap() = Some(name.to_string());
    }

    /// Files currently sitting in the shared inbox.
    pub fn inbox_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.air.inbox.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    /// Writes `bytes` into the shared inbox as a freshly received file.
    pub fn inbox_file(&self, bytes: &[u8]) -> PathBuf {
        let n = self.air.received.fetch_add(1, Ordering::SeqCst);
        let path = self.air.inbox.path().join(format!("incoming-{n}.part"));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn connected_to(&self, peer: &PeerId) -> PairingResult<()> {
        let nodes = self.air.nodes.lock().unwrap();
        match nodes.get(&self.me).and_then(|n| n.connected.as_ref()) {
            Some(p) if p == peer => Ok(()),
            _ => Err(PairingError::Transport(format!("not connected to {peer}"))),
        }
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn advertise(&self, service: &str, sink: TransportSink) -> PairingResult<()> {
        let mut nodes = self.air.nodes.lock().unwrap();
        for (id, node) in nodes.iter() {
            if *id != self.me
                && node.browsing.as_deref() == Some(service)
                && let Some(their) = &node.sink
            {
                their.emit(TransportEvent::PeerFound(self.me.clone()));
            }
        }
        let node = nodes.entry(self.me.clone()).or_default();
        node.sink = Some(sink);
        node.advertising = Some(service.to_string());
        Ok(())
    }

    async fn browse(&self, service: &str, sink: TransportSink) -> PairingResult<()> {
        let mut nodes = self.air.nodes.lock().unwrap();
        for (id, node) in nodes.iter() {
            if *id != self.me && node.advertising.as_deref() == Some(service) {
                sink.emit(TransportEvent::PeerFound(id.clone()));
            }
        }
        let node = nodes.entry(self.me.clone()).or_default();
        node.sink = Some(sink);
        node.browsing = Some(service.to_string());
        Ok(())
    }

    async fn invite(&self, peer: &PeerId) -> PairingResult<()> {
        let mut nodes = self.air.nodes.lock().unwrap();
        let target = nodes
            .get_mut(peer)
            .filter(|n| n.advertising.is_some())
            .ok_or_else(|| PairingError::Transport(format!("{peer} is not advertising")))?;
        target.pending_invite = Some(self.me.clone());
        if let Some(sink) = &target.sink {
            sink.emit(TransportEvent::InvitationReceived(self.me.clone()));
        }
        Ok(())
    }

    async fn accept(&self, peer: &PeerId) -> PairingResult<()> {
        let mut nodes = self.air.nodes.lock().unwrap();
        let mine = nodes.entry(self.me.clone()).or_default();
        if mine.pending_invite.as_ref() != Some(peer) {
            return Err(PairingError::Transport(format!("no invitation from {peer}")));
        }
        mine.pending_invite = None;
        mine.connected = Some(peer.clone());
        if let Some(sink) = &mine.sink {
            sink.emit(TransportEvent::Connected(peer.clone()));
        }
        if let Some(theirs) = nodes.get_mut(peer) {
            theirs.connected = Some(self.me.clone());
            if let Some(sink) = &theirs.sink {
                sink.emit(TransportEvent::Connected(self.me.clone()));
            }
        }
        Ok(())
    }

    async fn send(&self, peer: &PeerId, bytes: Vec<u8>) -> PairingResult<()> {
        self.connected_to(peer)?;
        self.sent.lock().unwrap().push(bytes.clone());
        self.air.emit(
            peer,
            TransportEvent::Data {
                from: self.me.clone(),
                bytes,
            },
        );
        Ok(())
    }

    async fn send_resource(
        &self,
        peer: &PeerId,
        path: &Path,
        name: &str,
        progress: SendProgress,
    ) -> PairingResult<()> {
        self.connected_to(peer)?;
        let bytes = tokio::fs::read(path).await?;
        let name = self
            .resource_name
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| name.to_string());
        let name = name.as_str();
        let from = self.me.clone();
        self.air.emit(
            peer,
            TransportEvent::ResourceStarted {
                from: from.clone(),
                name: name.to_string(),
            },
        );
        for fraction in [0.25, 0.5, 0.75] {
            tokio::time::sleep(Duration::from_millis(5)).await;
            progress(fraction);
            self.air.emit(
                peer,
                TransportEvent::ResourceProgress {
                    from: from.clone(),
                    fraction,
                },
            );
        }
        let temp = self.inbox_file(&bytes);
        progress(1.0);
        self.air.emit(
            peer,
            TransportEvent::ResourceFinished {
                from,
                name: name.to_string(),
                result: Ok(temp),
            },
        );
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        let mut nodes = self.air.nodes.lock().unwrap();
        let peer = nodes.get_mut(&self.me).and_then(|mine| {
            let peer = mine.connected.take();
            *mine = Node::default();
            peer
        });
        if let Some(peer) = peer
            && let Some(theirs) = nodes.get_mut(&peer)
        {
            theirs.connected = None;
            if let Some(sink) = &theirs.sink {
                sink.emit(TransportEvent::Disconnected(self.me.clone()));
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────

/// Waits up to five seconds for `handle` to reach a state matching `pred`.
pub async fn reach(
    handle: &PairingHandle,
    pred: impl FnMut(&PairingState) -> bool,
) -> PairingState {
    tokio::time::timeout(Duration::from_secs(5), handle.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .unwrap()
}

/// Drains every transition published so far.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<PairingState>) -> Vec<PairingState> {
    let mut out = Vec::new();
    while let Ok(state) = rx.try_recv() {
        out.push(state);
    }
    out
}

/// Collapses consecutive duplicates, treating every `Transferring` value
/// as the same milestone.
pub fn milestones(seen: &[PairingState]) -> Vec<PairingState> {
    let mut out: Vec<PairingState> = Vec::new();
    for s in seen {
        let s = match s {
            PairingState::Transferring(_) => PairingState::Transferring(0.0),
            other => other.clone(),
        };
        if out.last() != Some(&s) {
            out.push(s);
        }
    }
    out
}
