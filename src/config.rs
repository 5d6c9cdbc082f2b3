use std::net::SocketAddr;

/// Which text a pipeline puts on the shared broadcast queue for fan-out
/// to the other sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastPayload {
    /// The generated, in-character rendition (default).
    Generated,
    /// The author's raw utterance.
    Raw,
}

/// Bounded capacities for the per-session queues.
#[derive(Debug, Clone, Copy)]
pub struct QueueCapacities {
    pub inbound: usize,
    pub outbound: usize,
    pub broadcast_inbound: usize,
}

impl Default for QueueCapacities {
    fn default() -> Self {
        Self {
            inbound: 100,
            outbound: 100,
            broadcast_inbound: 100,
        }
    }
}

/// Tuning for the relay core: history bounds, context window, queue
/// capacities, and the broadcast payload choice.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum entries held by the history ring buffer.
    pub history_capacity: usize,
    /// How many recent exchanges a pipeline hands to the generator.
    pub context_window: usize,
    /// Capacity of the shared broadcast queue feeding the hub.
    pub broadcast_queue_capacity: usize,
    pub queue_capacities: QueueCapacities,
    pub broadcast_payload: BroadcastPayload,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            context_window: 5,
            broadcast_queue_capacity: 1000,
            queue_capacities: QueueCapacities::default(),
            broadcast_payload: BroadcastPayload::Generated,
        }
    }
}

impl RelayConfig {
    /// Load relay tuning from environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            history_capacity: env_usize("HISTORY_CAPACITY")
                .filter(|&n| n > 0)
                .unwrap_or(defaults.history_capacity),
            context_window: env_usize("CONTEXT_WINDOW").unwrap_or(defaults.context_window),
            broadcast_queue_capacity: env_usize("BROADCAST_QUEUE_CAPACITY")
                .filter(|&n| n > 0)
                .unwrap_or(defaults.broadcast_queue_capacity),
            queue_capacities: QueueCapacities {
                inbound: env_usize("INBOUND_QUEUE_CAPACITY")
                    .filter(|&n| n > 0)
                    .unwrap_or(defaults.queue_capacities.inbound),
                outbound: env_usize("OUTBOUND_QUEUE_CAPACITY")
                    .filter(|&n| n > 0)
                    .unwrap_or(defaults.queue_capacities.outbound),
                broadcast_inbound: env_usize("BROADCAST_INBOUND_QUEUE_CAPACITY")
                    .filter(|&n| n > 0)
                    .unwrap_or(defaults.queue_capacities.broadcast_inbound),
            },
            broadcast_payload: match std::env::var("BROADCAST_PAYLOAD").as_deref() {
                Ok("raw") => BroadcastPayload::Raw,
                _ => BroadcastPayload::Generated,
            },
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Allowed CORS origins. Empty means allow any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let listen_addr = std::env::var("LISTEN_ADDR")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.listen_addr);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty() && *o != "*")
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        Self {
            listen_addr,
            allowed_origins,
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_relay_config_matches_wire_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.history_capacity, 1000);
        assert_eq!(config.context_window, 5);
        assert_eq!(config.broadcast_queue_capacity, 1000);
        assert_eq!(config.queue_capacities.inbound, 100);
        assert_eq!(config.broadcast_payload, BroadcastPayload::Generated);
    }

    #[test]
    #[serial]
    fn relay_config_reads_env_overrides() {
        std::env::set_var("HISTORY_CAPACITY", "50");
        std::env::set_var("CONTEXT_WINDOW", "3");
        std::env::set_var("BROADCAST_PAYLOAD", "raw");

        let config = RelayConfig::from_env();
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.context_window, 3);
        assert_eq!(config.broadcast_payload, BroadcastPayload::Raw);

        std::env::remove_var("HISTORY_CAPACITY");
        std::env::remove_var("CONTEXT_WINDOW");
        std::env::remove_var("BROADCAST_PAYLOAD");
    }

    #[test]
    #[serial]
    fn garbage_env_values_fall_back_to_defaults() {
        std::env::set_var("HISTORY_CAPACITY", "not-a-number");
        std::env::set_var("BROADCAST_PAYLOAD", "shouted");

        let config = RelayConfig::from_env();
        assert_eq!(config.history_capacity, 1000);
        assert_eq!(config.broadcast_payload, BroadcastPayload::Generated);

        std::env::remove_var("HISTORY_CAPACITY");
        std::env::remove_var("BROADCAST_PAYLOAD");
    }

    #[test]
    #[serial]
    fn server_config_parses_origin_list() {
        std::env::set_var("LISTEN_ADDR", "127.0.0.1:9999");
        std::env::set_var("ALLOWED_ORIGINS", "https://a.example, https://b.example");

        let config = ServerConfig::from_env();
        assert_eq!(config.listen_addr.port(), 9999);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );

        std::env::remove_var("LISTEN_ADDR");
        std::env::remove_var("ALLOWED_ORIGINS");
    }
}
