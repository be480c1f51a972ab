use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::LinkError;

pub const DEFAULT_ROAD_URL: &str = "http://127.0.0.1:8080/api/v1";

/// Exchange endpoint and pacing shared by both roles.
#[derive(Debug, Clone, Args)]
pub struct LinkConfig {
    /// Base URL of the exchange API
    #[arg(long, env = "CRADLE_ROAD_URL", default_value = DEFAULT_ROAD_URL)]
    pub road_url: String,

    /// Room key; omitted means the server's default room
    #[arg(long, env = "CRADLE_ROOM")]
    pub room: Option<String>,

    #[arg(long, env = "CRADLE_POLL_INTERVAL_MS", default_value_t = 5_000)]
    pub poll_interval_ms: u64,

    #[arg(long, env = "CRADLE_PUBLISH_INTERVAL_MS", default_value_t = 250)]
    pub publish_interval_ms: u64,

    /// Upper bound on candidate gathering; 0 waits indefinitely
    #[arg(long, env = "CRADLE_GATHER_TIMEOUT_MS", default_value_t = 15_000)]
    pub gather_timeout_ms: u64,

    #[arg(long, env = "CRADLE_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// STUN/TURN urls, comma separated
    #[arg(long = "ice-server", env = "CRADLE_ICE_SERVERS", value_delimiter = ',')]
    pub ice_servers: Vec<String>,
}

impl LinkConfig {
    pub fn timing(&self) -> Result<LinkTiming, LinkError> {
        if self.poll_interval_ms == 0 {
            return Err(LinkError::Config("poll interval must be positive".into()));
        }
        if self.publish_interval_ms == 0 {
            return Err(LinkError::Config("publish interval must be positive".into()));
        }
        Ok(LinkTiming {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            publish_interval: Duration::from_millis(self.publish_interval_ms),
            gather_timeout: (self.gather_timeout_ms > 0)
                .then(|| Duration::from_millis(self.gather_timeout_ms)),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn room(&self) -> Option<&str> {
        self.room
            .as_deref()
            .map(str::trim)
            .filter(|room| !room.is_empty())
    }
}

/// Per-user directory for client metadata, when the platform has one.
pub fn default_state_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("cradle"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    pub poll_interval: Duration,
    pub publish_interval: Duration,
    /// `None` waits for gathering without a bound.
    pub gather_timeout: Option<Duration>,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            publish_interval: Duration::from_millis(250),
            gather_timeout: Some(Duration::from_secs(15)),
        }
    }
}
