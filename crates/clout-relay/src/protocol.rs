//! Relay wire protocol (§6): JSON messages shaped `{type, from?, to?,
//! payload}`, with `type` one of `auth_challenge`, `auth_response`,
//! `register`, `signal`, `forward`, `query_peers`, `error`.

use serde::{Deserialize, Serialize};

pub const CLOSE_BAD_AUTH: u16 = 4001;
pub const CLOSE_CHALLENGE_EXPIRED: u16 = 4002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMessageKind {
    AuthChallenge,
    AuthResponse,
    Register,
    Signal,
    Forward,
    QueryPeers,
    Error,
}

/// The literal wire shape of every relay message (§6 "`{type, from?, to?,
/// payload}`"): one struct rather than a tagged enum over variants, since
/// `from`/`to` sit beside `type` rather than nested per-variant. `payload`
/// is parsed into a typed shape per `kind` at the point of use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMessage {
    #[serde(rename = "type")]
    pub kind: RelayMessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default = "serde_json::Value::default")]
    pub payload: serde_json::Value,
}

impl RelayMessage {
    pub fn new(kind: RelayMessageKind, payload: serde_json::Value) -> Self {
        Self { kind, from: None, to: None, payload }
    }

    pub fn routed(kind: RelayMessageKind, from: String, to: String, payload: serde_json::Value) -> Self {
        Self { kind, from: Some(from), to: Some(to), payload }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(RelayMessageKind::Error, serde_json::json!({ "message": message.into() }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthChallengePayload {
    pub nonce: String,
    pub expires_at: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponsePayload {
    pub public_key: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResultPayload {
    pub success: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPayload {
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForwardPayload {
    pub id: String,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryPeersPayload {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    50
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryPeersResultPayload {
    pub peers: Vec<String>,
}

/// `sign(nonce ‖ pubkey, pubkey)` (§4.7 session diagram): the exact bytes
/// an auth-challenge response must be signed over.
pub fn auth_challenge_signing_bytes(nonce: &str, public_key_hex: &str) -> Vec<u8> {
    format!("{nonce}{public_key_hex}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_message_serializes_with_type_tag_and_optional_routing() {
        let msg = RelayMessage::routed(RelayMessageKind::Signal, "alice".into(), "bob".into(), serde_json::json!({"x": 1}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "signal");
        assert_eq!(value["from"], "alice");
        assert_eq!(value["to"], "bob");
    }

    #[test]
    fn unrouted_message_omits_from_and_to() {
        let msg = RelayMessage::new(RelayMessageKind::AuthChallenge, serde_json::json!({"nonce": "ab"}));
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("from").is_none());
        assert!(value.get("to").is_none());
    }

    #[test]
    fn auth_response_payload_parses_from_generic_payload() {
        let msg = RelayMessage::new(
            RelayMessageKind::AuthResponse,
            serde_json::json!({"public_key": "aa", "signature": "bb"}),
        );
        let parsed: AuthResponsePayload = serde_json::from_value(msg.payload).unwrap();
        assert_eq!(parsed.public_key, "aa");
    }
}
