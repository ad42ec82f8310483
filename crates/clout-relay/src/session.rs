//! Per-connection session state machine (§4.7): `PendingAuth →
//! Authenticated → Registered`. A connection holds at most one identity
//! for its lifetime.

use parking_lot::Mutex;
use rand::RngCore;

use crate::protocol::{
    auth_challenge_signing_bytes, AuthChallengePayload, AuthResponsePayload, AuthResultPayload, RegisterPayload, RelayMessage,
    RelayMessageKind, CLOSE_BAD_AUTH, CLOSE_CHALLENGE_EXPIRED,
};

#[derive(Debug, Clone)]
enum State {
    PendingAuth { nonce: String, challenge_expires_at: u64 },
    Authenticated { public_key: String },
    Registered { public_key: String },
}

/// What a connection's driver loop should do in response to one inbound
/// frame. `Close` carries the relay close code (§4.7 4001/4002).
#[derive(Debug)]
pub enum SessionEvent {
    Reply(RelayMessage),
    Forward { to: String, message: RelayMessage },
    QueryPeers { requester: String, max_results: usize },
    Close(u16, &'static str),
}

/// §4.7 "any message other than `auth_response` before authentication is
/// an error; `register` is required before `signal`, `forward`, or
/// `query_peers`".
pub struct RelaySession {
    state: Mutex<State>,
    challenge_window_ms: u64,
}

impl RelaySession {
    /// Start a fresh session, returning it alongside the `auth_challenge`
    /// frame to send immediately (§4.7 "connect -> AUTH_CHALLENGE sent").
    pub fn start(now_ms: u64, challenge_window_ms: u64) -> (Self, RelayMessage) {
        let mut nonce_bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = hex::encode(nonce_bytes);
        let challenge_expires_at = now_ms + challenge_window_ms;

        let challenge = RelayMessage::new(
            RelayMessageKind::AuthChallenge,
            serde_json::to_value(AuthChallengePayload { nonce: nonce.clone(), expires_at: challenge_expires_at }).unwrap(),
        );
        let session = Self { state: Mutex::new(State::PendingAuth { nonce, challenge_expires_at }), challenge_window_ms };
        (session, challenge)
    }

    pub fn public_key(&self) -> Option<String> {
        match &*self.state.lock() {
            State::PendingAuth { .. } => None,
            State::Authenticated { public_key } | State::Registered { public_key } => Some(public_key.clone()),
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(&*self.state.lock(), State::Registered { .. })
    }

    /// Handle one inbound frame, advancing the state machine. Never
    /// panics; unexpected transitions produce a `Close` or an `error`
    /// reply per §4.7's transition table.
    pub fn handle(&self, message: &RelayMessage, now_ms: u64) -> SessionEvent {
        let mut state = self.state.lock();
        match (&*state, message.kind) {
            (State::PendingAuth { nonce, challenge_expires_at }, RelayMessageKind::AuthResponse) => {
                if now_ms > *challenge_expires_at {
                    return SessionEvent::Close(CLOSE_CHALLENGE_EXPIRED, "auth challenge expired");
                }
                let Ok(response) = serde_json::from_value::<AuthResponsePayload>(message.payload.clone()) else {
                    return SessionEvent::Close(CLOSE_BAD_AUTH, "malformed auth_response payload");
                };
                let signing_bytes = auth_challenge_signing_bytes(nonce, &response.public_key);
                if clout_crypto::identity::verify_hex(&response.public_key, &signing_bytes, &response.signature).is_err() {
                    return SessionEvent::Close(CLOSE_BAD_AUTH, "auth_response signature failed to verify");
                }
                *state = State::Authenticated { public_key: response.public_key };
                SessionEvent::Reply(RelayMessage::new(
                    RelayMessageKind::AuthResponse,
                    serde_json::to_value(AuthResultPayload { success: true }).unwrap(),
                ))
            }
            (State::PendingAuth { .. }, _) => SessionEvent::Close(CLOSE_BAD_AUTH, "message sent before authentication"),

            (State::Authenticated { public_key }, RelayMessageKind::Register) => {
                let Ok(register) = serde_json::from_value::<RegisterPayload>(message.payload.clone()) else {
                    return SessionEvent::Reply(RelayMessage::error("malformed register payload"));
                };
                if register.public_key != *public_key {
                    return SessionEvent::Reply(RelayMessage::error("register public key must match the authenticated identity"));
                }
                let public_key = public_key.clone();
                *state = State::Registered { public_key };
                SessionEvent::Reply(RelayMessage::new(RelayMessageKind::Register, serde_json::json!({ "success": true })))
            }
            (State::Authenticated { .. }, _) => SessionEvent::Reply(RelayMessage::error("register is required before signal, forward, or query_peers")),

            (State::Registered { public_key }, RelayMessageKind::Signal) | (State::Registered { public_key }, RelayMessageKind::Forward) => {
                self.route(public_key, message)
            }
            (State::Registered { public_key }, RelayMessageKind::QueryPeers) => {
                let max_results =
                    serde_json::from_value::<crate::protocol::QueryPeersPayload>(message.payload.clone()).map(|p| p.max_results).unwrap_or(50);
                SessionEvent::QueryPeers { requester: public_key.clone(), max_results }
            }
            (State::Registered { .. }, _) => SessionEvent::Reply(RelayMessage::error("unexpected message type once registered")),
        }
    }

    /// §4.7 "`signal` and `forward` reject mismatched `from`" / §8
    /// invariant 8 "relay identity binding": `from` must equal the
    /// connection's authenticated public key.
    fn route(&self, authenticated: &str, message: &RelayMessage) -> SessionEvent {
        let Some(from) = &message.from else {
            return SessionEvent::Reply(RelayMessage::error("Sender identity mismatch"));
        };
        if from != authenticated {
            return SessionEvent::Reply(RelayMessage::error("Sender identity mismatch"));
        }
        let Some(to) = message.to.clone() else {
            return SessionEvent::Reply(RelayMessage::error("missing destination"));
        };
        SessionEvent::Forward { to, message: message.clone() }
    }

    pub fn challenge_window_ms(&self) -> u64 {
        self.challenge_window_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_response(identity: &clout_crypto::Identity, nonce: &str) -> RelayMessage {
        let bytes = auth_challenge_signing_bytes(nonce, &identity.public_key_hex());
        let signature = clout_crypto::canonical::to_hex(&identity.sign(&bytes));
        RelayMessage::new(
            RelayMessageKind::AuthResponse,
            serde_json::to_value(AuthResponsePayload { public_key: identity.public_key_hex(), signature }).unwrap(),
        )
    }

    fn nonce_of(challenge: &RelayMessage) -> String {
        serde_json::from_value::<AuthChallengePayload>(challenge.payload.clone()).unwrap().nonce
    }

    #[test]
    fn full_handshake_reaches_registered() {
        let identity = clout_crypto::Identity::generate();
        let (session, challenge) = RelaySession::start(0, 30_000);
        let nonce = nonce_of(&challenge);

        let response = auth_response(&identity, &nonce);
        let event = session.handle(&response, 1_000);
        assert!(matches!(event, SessionEvent::Reply(_)));
        assert_eq!(session.public_key(), Some(identity.public_key_hex()));

        let register = RelayMessage::new(
            RelayMessageKind::Register,
            serde_json::to_value(RegisterPayload { public_key: identity.public_key_hex() }).unwrap(),
        );
        let event = session.handle(&register, 1_000);
        assert!(matches!(event, SessionEvent::Reply(_)));
        assert!(session.is_registered());
    }

    #[test]
    fn tampered_auth_response_closes_4001() {
        let identity = clout_crypto::Identity::generate();
        let (session, challenge) = RelaySession::start(0, 30_000);
        let nonce = nonce_of(&challenge);
        let mut response = auth_response(&identity, &nonce);
        response.payload["signature"] = serde_json::json!("00".repeat(64));

        let event = session.handle(&response, 1_000);
        assert!(matches!(event, SessionEvent::Close(crate::protocol::CLOSE_BAD_AUTH, _)));
    }

    #[test]
    fn expired_challenge_closes_4002() {
        let identity = clout_crypto::Identity::generate();
        let (session, challenge) = RelaySession::start(0, 30_000);
        let nonce = nonce_of(&challenge);
        let response = auth_response(&identity, &nonce);

        let event = session.handle(&response, 31_000);
        assert!(matches!(event, SessionEvent::Close(crate::protocol::CLOSE_CHALLENGE_EXPIRED, _)));
    }

    #[test]
    fn register_with_mismatched_key_is_rejected() {
        let identity = clout_crypto::Identity::generate();
        let other = clout_crypto::Identity::generate();
        let (session, challenge) = RelaySession::start(0, 30_000);
        let nonce = nonce_of(&challenge);
        session.handle(&auth_response(&identity, &nonce), 1_000);

        let register = RelayMessage::new(
            RelayMessageKind::Register,
            serde_json::to_value(RegisterPayload { public_key: other.public_key_hex() }).unwrap(),
        );
        let event = session.handle(&register, 1_000);
        assert!(matches!(event, SessionEvent::Reply(_)));
        assert!(!session.is_registered());
    }

    #[test]
    fn signal_before_register_is_an_error_not_a_close() {
        let identity = clout_crypto::Identity::generate();
        let (session, challenge) = RelaySession::start(0, 30_000);
        let nonce = nonce_of(&challenge);
        session.handle(&auth_response(&identity, &nonce), 1_000);

        let signal = RelayMessage::routed(RelayMessageKind::Signal, identity.public_key_hex(), "bob".into(), serde_json::json!({}));
        let event = session.handle(&signal, 1_000);
        assert!(matches!(event, SessionEvent::Reply(_)));
    }

    #[test]
    fn spoofed_sender_identity_is_rejected() {
        let identity = clout_crypto::Identity::generate();
        let (session, challenge) = RelaySession::start(0, 30_000);
        let nonce = nonce_of(&challenge);
        session.handle(&auth_response(&identity, &nonce), 1_000);
        session.handle(
            &RelayMessage::new(RelayMessageKind::Register, serde_json::to_value(RegisterPayload { public_key: identity.public_key_hex() }).unwrap()),
            1_000,
        );

        let spoofed = RelayMessage::routed(RelayMessageKind::Signal, "0xBB".into(), "0xCC".into(), serde_json::json!({}));
        let event = session.handle(&spoofed, 1_000);
        match event {
            SessionEvent::Reply(msg) => assert_eq!(msg.payload["message"], "Sender identity mismatch"),
            other => panic!("expected a Reply with an error payload, got {other:?}"),
        }
    }
}
