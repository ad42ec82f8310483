//! Mediation server (§4.7): an axum WebSocket listener that runs one
//! [`RelaySession`] per connection, a registry of authenticated peers for
//! `forward`/`signal` routing, and the `Sweeper`-driven maintenance
//! (forward-dedup expiry, stale-client reaping) the teacher runs as
//! background `tokio::spawn` loops in `freeq-server/src/server.rs`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use clout_core::scheduler::spawn_sweeper;

use crate::config::RelayConfig;
use crate::protocol::{ForwardPayload, QueryPeersResultPayload, RelayMessage, RelayMessageKind};
use crate::session::{RelaySession, SessionEvent};

pub(crate) fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

struct PeerHandle {
    outbound: mpsc::UnboundedSender<RelayMessage>,
    last_seen_ms: AtomicU64,
}

/// Shared relay state: the connection registry and the forward-dedup
/// cache, both reaped by background sweepers (§4.7 "stale clients...
/// disconnected", "`forward` deduplicates on `payload.id` within a short
/// window").
pub struct RelayServer {
    config: RelayConfig,
    peers: Mutex<HashMap<String, PeerHandle>>,
    forward_seen: Mutex<HashMap<String, u64>>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self { config, peers: Mutex::new(HashMap::new()), forward_seen: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Spawn the forward-dedup and stale-client sweepers. Returns their
    /// join handles so a caller can hold onto them for the server's
    /// lifetime (dropping aborts them — mirrors `spawn_sweeper`'s own
    /// contract).
    pub fn spawn_sweepers(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let dedup_window_ms = self.config.forward_dedup_window_ms;
        let stale_timeout_ms = self.config.stale_client_timeout_ms;
        let interval = Duration::from_millis(self.config.sweep_interval_ms);

        let dedup_server = Arc::clone(self);
        let dedup_sweeper = spawn_sweeper(interval, move || {
            let now = now_ms();
            dedup_server.forward_seen.lock().retain(|_, seen_at| now.saturating_sub(*seen_at) < dedup_window_ms);
        });

        let stale_server = Arc::clone(self);
        let stale_sweeper = spawn_sweeper(interval, move || {
            let now = now_ms();
            stale_server.peers.lock().retain(|_, peer| now.saturating_sub(peer.last_seen_ms.load(Ordering::Relaxed)) < stale_timeout_ms);
        });

        vec![dedup_sweeper, stale_sweeper]
    }

    fn touch(&self, public_key: &str) {
        if let Some(peer) = self.peers.lock().get(public_key) {
            peer.last_seen_ms.store(now_ms(), Ordering::Relaxed);
        }
    }

    fn register(&self, public_key: String, outbound: mpsc::UnboundedSender<RelayMessage>) {
        self.peers.lock().insert(public_key, PeerHandle { outbound, last_seen_ms: AtomicU64::new(now_ms()) });
    }

    fn unregister(&self, public_key: &str) {
        self.peers.lock().remove(public_key);
    }

    /// §4.7 "`forward` deduplicates on `payload.id`": returns `true` the
    /// first time an id is seen within the window, `false` on a repeat.
    fn admit_forward(&self, id: &str) -> bool {
        let now = now_ms();
        let mut seen = self.forward_seen.lock();
        match seen.get(id) {
            Some(seen_at) if now.saturating_sub(*seen_at) < self.config.forward_dedup_window_ms => false,
            _ => {
                seen.insert(id.to_string(), now);
                true
            }
        }
    }

    /// §4.7 "`query_peers` returns authenticated peers only, excluding
    /// requester, bounded by `maxResults`".
    fn query_peers(&self, requester: &str, max_results: usize) -> Vec<String> {
        let cap = max_results.min(self.config.max_query_results_ceiling);
        self.peers.lock().keys().filter(|key| key.as_str() != requester).take(cap).cloned().collect()
    }

    fn deliver(&self, to: &str, message: RelayMessage) -> bool {
        match self.peers.lock().get(to) {
            Some(peer) => peer.outbound.send(message).is_ok(),
            None => false,
        }
    }
}

pub fn router(server: Arc<RelayServer>) -> Router {
    Router::new().route("/relay", get(ws_upgrade)).with_state(server)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(server): State<Arc<RelayServer>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, server))
}

async fn handle_connection(socket: WebSocket, server: Arc<RelayServer>) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<RelayMessage>();

    let (session, challenge) = RelaySession::start(now_ms(), server.config().challenge_window_ms);
    if send(&mut sink, &challenge).await.is_err() {
        return;
    }

    let mut registered_as: Option<String> = None;

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(message) => {
                        if send(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                let Some(inbound) = inbound else { break };
                let Ok(inbound) = inbound else { break };
                let text = match inbound {
                    WsMessage::Text(text) => text,
                    WsMessage::Close(_) => break,
                    _ => continue,
                };
                let Ok(message) = serde_json::from_str::<RelayMessage>(&text) else {
                    let _ = send(&mut sink, &RelayMessage::error("malformed message")).await;
                    continue;
                };

                let was_registered = session.is_registered();
                match session.handle(&message, now_ms()) {
                    SessionEvent::Reply(reply) => {
                        if !was_registered && session.is_registered() {
                            if let Some(public_key) = session.public_key() {
                                server.register(public_key.clone(), outbound_tx.clone());
                                registered_as = Some(public_key);
                            }
                        }
                        if let Some(public_key) = &registered_as {
                            server.touch(public_key);
                        }
                        if send(&mut sink, &reply).await.is_err() {
                            break;
                        }
                    }
                    SessionEvent::Close(code, reason) => {
                        let _ = sink.send(WsMessage::Close(Some(axum::extract::ws::CloseFrame {
                            code,
                            reason: reason.into(),
                        }))).await;
                        break;
                    }
                    SessionEvent::Forward { to, message } => {
                        if let Some(public_key) = &registered_as {
                            server.touch(public_key);
                        }
                        let admitted = match message.kind {
                            RelayMessageKind::Forward => serde_json::from_value::<ForwardPayload>(message.payload.clone())
                                .map(|payload| server.admit_forward(&payload.id))
                                .unwrap_or(true),
                            _ => true,
                        };
                        if !admitted {
                            continue;
                        }
                        if !server.deliver(&to, message) {
                            let _ = send(&mut sink, &RelayMessage::error("destination peer is not connected")).await;
                        }
                    }
                    SessionEvent::QueryPeers { requester, max_results } => {
                        server.touch(&requester);
                        let peers = server.query_peers(&requester, max_results);
                        let reply = RelayMessage::new(
                            RelayMessageKind::QueryPeers,
                            serde_json::to_value(QueryPeersResultPayload { peers }).unwrap(),
                        );
                        if send(&mut sink, &reply).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    if let Some(public_key) = registered_as {
        server.unregister(&public_key);
    }
}

async fn send(sink: &mut SplitSink<WebSocket, WsMessage>, message: &RelayMessage) -> Result<(), ()> {
    let text = serde_json::to_string(message).map_err(|_| ())?;
    sink.send(WsMessage::Text(text.into())).await.map_err(|_| ())
}

/// Resolve a bind address for `RelayConfig::listen`, used by the binary
/// entrypoint so test code doesn't need a real socket.
pub fn resolve_listen_addr(listen: &str) -> anyhow::Result<SocketAddr> {
    Ok(listen.parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config() -> RelayConfig {
        RelayConfig::parse_from(["clout-relay"])
    }

    #[test]
    fn forward_dedup_admits_once_then_rejects_within_the_window() {
        let server = RelayServer::new(config());
        assert!(server.admit_forward("msg-1"));
        assert!(!server.admit_forward("msg-1"));
    }

    #[test]
    fn query_peers_excludes_the_requester_and_respects_the_cap() {
        let server = RelayServer::new(config());
        let (tx, _rx) = mpsc::unbounded_channel();
        server.register("alice".into(), tx.clone());
        server.register("bob".into(), tx.clone());
        server.register("carol".into(), tx);

        let peers = server.query_peers("alice", 1);
        assert_eq!(peers.len(), 1);
        assert!(!peers.contains(&"alice".to_string()));
    }

    #[test]
    fn deliver_reports_failure_for_an_unknown_peer() {
        let server = RelayServer::new(config());
        let message = RelayMessage::new(RelayMessageKind::Signal, serde_json::json!({}));
        assert!(!server.deliver("nobody", message));
    }

    #[test]
    fn resolve_listen_addr_parses_host_and_port() {
        let addr = resolve_listen_addr("127.0.0.1:9443").unwrap();
        assert_eq!(addr.port(), 9443);
    }
}
