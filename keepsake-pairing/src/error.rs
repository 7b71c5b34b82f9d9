use keepsake_model::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("control message codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("{action} not allowed while {state}")]
    InvalidState { action: &'static str, state: String },

    #[error("PIN must not be empty")]
    EmptyPin,

    #[error("refusing to store artifact named {0:?}")]
    InvalidArtifactName(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("pairing session has shut down")]
    ChannelClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PairingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PairingError::Codec(_)
            | PairingError::Config(_)
            | PairingError::InvalidArtifactName(_) => ErrorKind::Format,
            PairingError::Io(_) => ErrorKind::Io,
            PairingError::Transport(_)
            | PairingError::InvalidState { .. }
            | PairingError::EmptyPin
            | PairingError::ChannelClosed => ErrorKind::Protocol,
        }
    }
}

pub type PairingResult<T> = Result<T, PairingError>;
