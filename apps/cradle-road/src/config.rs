use std::net::{IpAddr, SocketAddr};

use clap::Parser;

use crate::store::DEFAULT_MAX_ROOMS;

/// Build id stamped by `build.rs`; served by `/version` unless overridden.
pub const BUILD_ID: &str = env!("CRADLE_BUILD_ID");

#[derive(Debug, Clone, Parser)]
#[command(name = "cradle-road")]
#[command(about = "Rendezvous exchange server for cradle peer sessions")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "CRADLE_ROAD_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "CRADLE_ROAD_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Path prefix for the exchange API; empty mounts it at the root
    #[arg(long, env = "CRADLE_API_PREFIX", default_value = "/api/v1")]
    pub api_prefix: String,

    /// Name reported by `/version`
    #[arg(long, env = "CRADLE_APP_NAME", default_value = "baby-monitor")]
    pub app_name: String,

    /// Build id reported by `/version` (defaults to the compile-time id)
    #[arg(long, env = "APP_LAST_UPDATE")]
    pub last_update: Option<String>,

    /// Named rooms that may hold an exchange at once
    #[arg(long, env = "CRADLE_ROAD_MAX_ROOMS", default_value_t = DEFAULT_MAX_ROOMS)]
    pub max_rooms: usize,

    /// tracing filter directive
    #[arg(long, env = "RUST_LOG", default_value = "info,cradle_road=debug")]
    pub log_filter: String,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn build_id(&self) -> String {
        self.last_update
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(BUILD_ID)
            .to_string()
    }
}
