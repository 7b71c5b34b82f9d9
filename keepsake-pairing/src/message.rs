//! Control messages exchanged over the reliable data channel.

use crate::error::PairingResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ControlMessage {
    /// Sender's PIN claim.
    #[serde(rename = "AuthPIN")]
    AuthPin(PinClaim),
    #[serde(rename = "AuthPINSuccess")]
    AuthPinSuccess,
    #[serde(rename = "AuthPINRejected")]
    AuthPinRejected,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinClaim {
    pub pin: String,
}

impl std::fmt::Debug for PinClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PinClaim([REDACTED])")
    }
}

impl ControlMessage {
    pub fn auth_pin(pin: impl Into<String>) -> Self {
        ControlMessage::AuthPin(PinClaim { pin: pin.into() })
    }

    pub fn encode(&self) -> PairingResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> PairingResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
