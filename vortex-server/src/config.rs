//! Server configuration, read from environment variables with sane
//! defaults. No config-loading crate — the teacher hardcodes its socket
//! address the same unceremonious way.

use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub default_lsh_hyperplanes: usize,
    pub default_lsh_tables: usize,
    pub replication_poll_interval: Duration,
    /// Dimension the built-in `HashEmbedder` stub produces. Collections
    /// created for use with text-only inserts must share this dimension; a
    /// real embedding provider would advertise its own model dimension the
    /// same way.
    pub embedding_dimension: usize,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("VORTEX_BIND_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let default_lsh_hyperplanes = std::env::var("VORTEX_LSH_HYPERPLANES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(12);

        let default_lsh_tables = std::env::var("VORTEX_LSH_TABLES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);

        let replication_poll_interval = std::env::var("VORTEX_REPLICATION_POLL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let embedding_dimension = std::env::var("VORTEX_EMBEDDING_DIMENSION")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(128);

        Self {
            bind_addr,
            default_lsh_hyperplanes,
            default_lsh_tables,
            replication_poll_interval,
            embedding_dimension,
        }
    }
}
