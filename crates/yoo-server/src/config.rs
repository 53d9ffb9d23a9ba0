//! Server configuration.

use std::time::Duration;

use yoo_settings::YooSettings;

/// Per-connection timers and limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Interval of the update tick (liveness check + payload injection).
    pub update_interval: Duration,
    /// Interval of ping probes and keepalive windows.
    pub ping_interval: Duration,
    /// Consecutive missed pong windows before a forced disconnect.
    pub max_missed_pongs: u32,
    /// How long a finished session waits for its background tasks.
    pub task_join_timeout: Duration,
    /// Upper bound on closing the transport during disconnect.
    pub close_timeout: Duration,
}

impl ConnectionConfig {
    /// Upper bound on a single outbound frame write.
    ///
    /// A peer that stops draining its socket must not stall the send loop
    /// past the next probe.
    pub fn send_timeout(&self) -> Duration {
        self.ping_interval
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(5),
            ping_interval: Duration::from_secs(5),
            max_missed_pongs: 2,
            task_join_timeout: Duration::from_secs(1),
            close_timeout: Duration::from_secs(1),
        }
    }
}

/// Configuration for the yoo-chat server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Bound on draining tasks at shutdown.
    pub shutdown_timeout: Duration,
    /// Per-connection settings.
    pub connection: ConnectionConfig,
}

impl ServerConfig {
    /// Derive the server configuration from loaded settings.
    pub fn from_settings(settings: &YooSettings) -> Self {
        let c = &settings.connection;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            shutdown_timeout: Duration::from_secs(settings.server.shutdown_timeout_secs),
            connection: ConnectionConfig {
                update_interval: c.update_interval(),
                ping_interval: c.ping_interval(),
                max_missed_pongs: c.max_missed_pongs,
                task_join_timeout: c.task_join_timeout(),
                ..ConnectionConfig::default()
            },
        }
    }

    /// `host:port` string for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 64 * 1024,
            shutdown_timeout: Duration::from_secs(30),
            connection: ConnectionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_ephemeral() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_address(), "127.0.0.1:0");
    }

    #[test]
    fn default_keepalive_timings() {
        let cfg = ConnectionConfig::default();
        assert_eq!(cfg.update_interval, Duration::from_secs(5));
        assert_eq!(cfg.ping_interval, Duration::from_secs(5));
        assert_eq!(cfg.max_missed_pongs, 2);
    }

    #[test]
    fn send_timeout_follows_ping_interval() {
        let cfg = ConnectionConfig {
            ping_interval: Duration::from_millis(250),
            ..ConnectionConfig::default()
        };
        assert_eq!(cfg.send_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn from_settings_copies_values() {
        let mut settings = YooSettings::default();
        settings.server.host = "10.0.0.1".into();
        settings.server.port = 9000;
        settings.server.shutdown_timeout_secs = 7;
        settings.connection.ping_interval_ms = 1500;
        settings.connection.update_interval_ms = 2500;
        settings.connection.max_missed_pongs = 4;
        settings.connection.task_join_timeout_ms = 300;

        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.bind_address(), "10.0.0.1:9000");
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(7));
        assert_eq!(cfg.connection.ping_interval, Duration::from_millis(1500));
        assert_eq!(cfg.connection.update_interval, Duration::from_millis(2500));
        assert_eq!(cfg.connection.max_missed_pongs, 4);
        assert_eq!(cfg.connection.task_join_timeout, Duration::from_millis(300));
    }
}
