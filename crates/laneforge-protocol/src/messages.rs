//! Handshake and lifecycle message bodies.

use serde::{Deserialize, Serialize};

/// Version spoken by this build. A mismatched hello is refused.
pub const PROTOCOL_VERSION: u32 = 1;

/// First message a client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub protocol_version: u32,
}

/// Server's answer to [`Hello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloAck {
    pub protocol_version: u32,
    pub accepted: bool,
}

/// Credentials presented after the hello.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticate {
    pub token: String,
}

/// Account data resolved from a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_id: u64,
    pub nickname: String,
}

/// Outcome of [`Authenticate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuthResult {
    pub fn accepted(account: AccountInfo) -> Self {
        Self {
            ok: true,
            account: Some(account),
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            account: None,
            reason: Some(reason.into()),
        }
    }
}

/// Sent once the Lane has moved a client to the loaded state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingComplete {
    pub tick: u64,
}
