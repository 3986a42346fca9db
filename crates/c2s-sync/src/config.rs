use std::time::Duration;

use c2s_core::KeyLayout;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Registry key layout for bookkeeping and auxiliary entries.
    pub layout: KeyLayout,
    /// Upper bound on one connect handshake (subscribe + network lookup).
    pub connect_timeout: Duration,
    /// Pause between failed steady-state reconnects.
    pub reconnect_delay: Duration,
    /// Network whose first gateway is used as fallback service address.
    pub bridge_network: String,
    /// Gateway used until the first successful connect.
    pub default_gateway: String,
    /// Re-run reconciliation after the event feed reconnects.
    pub resync_on_reconnect: bool,
    /// Bound of the supervisor to engine channel.
    pub event_queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            layout: KeyLayout::default(),
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            bridge_network: "bridge".to_string(),
            default_gateway: "172.17.0.1".to_string(),
            resync_on_reconnect: true,
            event_queue_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::SyncConfig;

    #[test]
    fn defaults_match_docker_conventions() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.bridge_network, "bridge");
        assert_eq!(cfg.default_gateway, "172.17.0.1");
        assert_eq!(cfg.connect_timeout, Duration::from_secs(5));
        assert_eq!(cfg.layout.bookkeeping_root(), "docker/service-ids/");
        assert!(cfg.resync_on_reconnect);
    }
}
