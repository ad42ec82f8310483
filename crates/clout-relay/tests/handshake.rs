//! End-to-end acceptance test: a real TCP listener, a real
//! `tokio-tungstenite` client, and the full auth-challenge -> register ->
//! signal state machine driven over the wire rather than in-process
//! (§4.7, §8 scenario 6).

use std::sync::Arc;

use clout_core::scheduler::spawn_sweeper;
use clout_relay::protocol::{
    auth_challenge_signing_bytes, AuthChallengePayload, AuthResponsePayload, QueryPeersResultPayload, RelayMessage, RelayMessageKind,
    RegisterPayload,
};
use clout_relay::server::{router, RelayServer};
use clout_relay::RelayConfig;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn spawn_relay() -> (String, Arc<RelayServer>) {
    let config = RelayConfig::parse_from(["clout-relay", "--listen", "127.0.0.1:0"]);
    let server = Arc::new(RelayServer::new(config));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(server.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{addr}/relay"), server)
}

async fn recv_message(ws: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin)) -> RelayMessage {
    loop {
        match ws.next().await.expect("connection closed unexpectedly").unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

async fn authenticate_and_register(
    url: &str,
    identity: &clout_crypto::Identity,
) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
    let (mut ws, _) = connect_async(url).await.expect("client handshake");

    let challenge = recv_message(&mut ws).await;
    assert_eq!(challenge.kind, RelayMessageKind::AuthChallenge);
    let challenge: AuthChallengePayload = serde_json::from_value(challenge.payload).unwrap();

    let signing_bytes = auth_challenge_signing_bytes(&challenge.nonce, &identity.public_key_hex());
    let signature = clout_crypto::canonical::to_hex(&identity.sign(&signing_bytes));
    let response = RelayMessage::new(
        RelayMessageKind::AuthResponse,
        serde_json::to_value(AuthResponsePayload { public_key: identity.public_key_hex(), signature }).unwrap(),
    );
    ws.send(Message::Text(serde_json::to_string(&response).unwrap().into())).await.unwrap();
    let reply = recv_message(&mut ws).await;
    assert_eq!(reply.kind, RelayMessageKind::AuthResponse);

    let register = RelayMessage::new(
        RelayMessageKind::Register,
        serde_json::to_value(RegisterPayload { public_key: identity.public_key_hex() }).unwrap(),
    );
    ws.send(Message::Text(serde_json::to_string(&register).unwrap().into())).await.unwrap();
    let reply = recv_message(&mut ws).await;
    assert_eq!(reply.kind, RelayMessageKind::Register);

    ws
}

#[tokio::test]
async fn two_peers_authenticate_and_exchange_a_signal() {
    let (url, _server) = spawn_relay().await;

    let alice = clout_crypto::Identity::generate();
    let bob = clout_crypto::Identity::generate();

    let mut alice_ws = authenticate_and_register(&url, &alice).await;
    let mut bob_ws = authenticate_and_register(&url, &bob).await;

    let signal = RelayMessage::routed(
        RelayMessageKind::Signal,
        alice.public_key_hex(),
        bob.public_key_hex(),
        serde_json::json!({"sdp": "fake-offer"}),
    );
    alice_ws.send(Message::Text(serde_json::to_string(&signal).unwrap().into())).await.unwrap();

    let received = recv_message(&mut bob_ws).await;
    assert_eq!(received.kind, RelayMessageKind::Signal);
    assert_eq!(received.from.as_deref(), Some(alice.public_key_hex().as_str()));
    assert_eq!(received.payload["sdp"], "fake-offer");
}

#[tokio::test]
async fn spoofed_sender_identity_never_reaches_the_recipient() {
    let (url, _server) = spawn_relay().await;

    let alice = clout_crypto::Identity::generate();
    let bob = clout_crypto::Identity::generate();

    let mut alice_ws = authenticate_and_register(&url, &alice).await;
    let mut bob_ws = authenticate_and_register(&url, &bob).await;

    // Alice claims to be someone else entirely (§8 scenario 6).
    let spoofed = RelayMessage::routed(
        RelayMessageKind::Signal,
        "0xBB".repeat(8),
        bob.public_key_hex(),
        serde_json::json!({"sdp": "spoofed"}),
    );
    alice_ws.send(Message::Text(serde_json::to_string(&spoofed).unwrap().into())).await.unwrap();

    let reply = recv_message(&mut alice_ws).await;
    assert_eq!(reply.kind, RelayMessageKind::Error);
    assert_eq!(reply.payload["message"], "Sender identity mismatch");

    // Bob must never see it: send a harmless signal right after and
    // confirm it's the first (and only) thing bob receives.
    let real_signal =
        RelayMessage::routed(RelayMessageKind::Signal, alice.public_key_hex(), bob.public_key_hex(), serde_json::json!({"sdp": "real"}));
    alice_ws.send(Message::Text(serde_json::to_string(&real_signal).unwrap().into())).await.unwrap();
    let received = recv_message(&mut bob_ws).await;
    assert_eq!(received.payload["sdp"], "real");
}

#[tokio::test]
async fn query_peers_excludes_requester_over_the_wire() {
    let (url, _server) = spawn_relay().await;

    let alice = clout_crypto::Identity::generate();
    let bob = clout_crypto::Identity::generate();
    let mut alice_ws = authenticate_and_register(&url, &alice).await;
    let _bob_ws = authenticate_and_register(&url, &bob).await;

    let query = RelayMessage::new(RelayMessageKind::QueryPeers, serde_json::json!({"max_results": 10}));
    alice_ws.send(Message::Text(serde_json::to_string(&query).unwrap().into())).await.unwrap();
    let reply = recv_message(&mut alice_ws).await;
    let result: QueryPeersResultPayload = serde_json::from_value(reply.payload).unwrap();
    assert_eq!(result.peers, vec![bob.public_key_hex()]);
}

/// Smoke-test the shared sweeper idiom (§9) actually runs against a live
/// server instance rather than just its unit tests.
#[tokio::test]
async fn sweepers_can_be_spawned_against_a_live_server() {
    let (_url, server) = spawn_relay().await;
    let handles = server.spawn_sweepers();
    assert_eq!(handles.len(), 2);
    for handle in handles {
        handle.abort();
    }
    let _ = spawn_sweeper(std::time::Duration::from_millis(10), || {});
}
