//! Relay startup configuration (§4.7), parsed from the command line the
//! way `freeq-server`'s standalone binaries parse theirs.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "clout-relay", about = "Mediation server for the clout reputation protocol")]
pub struct RelayConfig {
    /// Listen address for the WebSocket endpoint.
    #[arg(long, default_value = "127.0.0.1:9443")]
    pub listen: String,

    /// How long an `auth_challenge` stays valid before the connection is
    /// closed with 4002.
    #[arg(long, default_value_t = 30_000)]
    pub challenge_window_ms: u64,

    /// Window within which a `forward` with a repeated `payload.id` is
    /// dropped as a duplicate.
    #[arg(long, default_value_t = 5 * 60 * 1000)]
    pub forward_dedup_window_ms: u64,

    /// Idle time after which a connection with no activity is reaped.
    #[arg(long, default_value_t = 5 * 60 * 1000)]
    pub stale_client_timeout_ms: u64,

    /// Interval at which the sweepers (dedup cache, stale clients,
    /// expired pending-auth) run.
    #[arg(long, default_value_t = 30_000)]
    pub sweep_interval_ms: u64,

    /// Upper bound accepted for a client-supplied `query_peers.maxResults`.
    #[arg(long, default_value_t = 200)]
    pub max_query_results_ceiling: usize,

    /// Bind only to loopback and refuse to start if `listen` resolves to
    /// a non-loopback address — the "Tor-only mode" of §4.7, where the
    /// relay is expected to be reached only via a local onion-service
    /// forwarding rule.
    #[arg(long, default_value_t = false)]
    pub tor_only: bool,
}

impl RelayConfig {
    /// `true` if `listen` is a loopback address. Used to enforce
    /// `tor_only` at startup.
    pub fn listen_is_loopback(&self) -> bool {
        self.listen
            .rsplit_once(':')
            .map(|(host, _port)| {
                host.trim_start_matches('[').trim_end_matches(']') == "localhost"
                    || host.parse::<std::net::IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_addresses_are_detected() {
        let cfg = RelayConfig::parse_from(["clout-relay", "--listen", "127.0.0.1:9443"]);
        assert!(cfg.listen_is_loopback());
    }

    #[test]
    fn non_loopback_addresses_are_rejected_by_the_check() {
        let cfg = RelayConfig::parse_from(["clout-relay", "--listen", "0.0.0.0:9443"]);
        assert!(!cfg.listen_is_loopback());
    }
}
