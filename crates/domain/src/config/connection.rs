use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Transport, queue and task-shutdown knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// API origin.  `https://` / `wss://` (or no scheme) selects TLS,
    /// `http://` / `ws://` selects plaintext.
    #[serde(default = "d_api_endpoint")]
    pub api_endpoint: String,
    /// WebSocket connect timeout.
    #[serde(default = "d_10000")]
    pub network_timeout_ms: u64,
    /// Token refresh request timeout.
    #[serde(default = "d_10000")]
    pub http_timeout_ms: u64,
    /// Per-message transmit timeout used by the outbound worker.
    #[serde(default = "d_5000")]
    pub send_timeout_ms: u64,
    /// Grace period for the close handshake in `stop`.
    #[serde(default = "d_100")]
    pub close_timeout_ms: u64,
    #[serde(default = "d_35")]
    pub outbound_queue_capacity: usize,
    #[serde(default = "d_10")]
    pub inbound_queue_capacity: usize,
    /// How long the event router waits for room in the inbound queue
    /// before dropping a complete message.
    #[serde(default = "d_10_u64")]
    pub inbound_enqueue_wait_ms: u64,
    /// Queue poll interval of both workers; bounds stop latency.
    #[serde(default = "d_100")]
    pub poll_interval_ms: u64,
    #[serde(default = "d_6000")]
    pub inbound_exit_wait_ms: u64,
    #[serde(default = "d_2000")]
    pub outbound_exit_wait_ms: u64,
    #[serde(default = "d_1000")]
    pub router_exit_wait_ms: u64,
    /// Ceiling for an incomplete inbound text message.
    #[serde(default = "d_65536")]
    pub max_reassembly_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            api_endpoint: d_api_endpoint(),
            network_timeout_ms: 10_000,
            http_timeout_ms: 10_000,
            send_timeout_ms: 5_000,
            close_timeout_ms: 100,
            outbound_queue_capacity: 35,
            inbound_queue_capacity: 10,
            inbound_enqueue_wait_ms: 10,
            poll_interval_ms: 100,
            inbound_exit_wait_ms: 6_000,
            outbound_exit_wait_ms: 2_000,
            router_exit_wait_ms: 1_000,
            max_reassembly_bytes: 64 * 1024,
        }
    }
}

impl ConnectionConfig {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn inbound_enqueue_wait(&self) -> Duration {
        Duration::from_millis(self.inbound_enqueue_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn inbound_exit_wait(&self) -> Duration {
        Duration::from_millis(self.inbound_exit_wait_ms)
    }

    pub fn outbound_exit_wait(&self) -> Duration {
        Duration::from_millis(self.outbound_exit_wait_ms)
    }

    pub fn router_exit_wait(&self) -> Duration {
        Duration::from_millis(self.router_exit_wait_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.api_endpoint.trim().is_empty() {
            return Err(Error::InvalidArgument("api_endpoint must not be empty".into()));
        }
        if self.outbound_queue_capacity == 0 || self.inbound_queue_capacity == 0 {
            return Err(Error::InvalidArgument("queue capacities must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidArgument("poll_interval_ms must be positive".into()));
        }
        if self.max_reassembly_bytes == 0 {
            return Err(Error::InvalidArgument(
                "max_reassembly_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Access token lifetime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "d_3600")]
    pub ttl_secs: u64,
    /// A cached token is refreshed this long before it actually expires.
    #[serde(default = "d_10_u64")]
    pub safety_margin_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3_600,
            safety_margin_secs: 10,
        }
    }
}

impl TokenConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.safety_margin_secs >= self.ttl_secs {
            return Err(Error::InvalidArgument(
                "token safety_margin_secs must be smaller than ttl_secs".into(),
            ));
        }
        Ok(())
    }
}

fn d_api_endpoint() -> String {
    "https://localhost".into()
}
fn d_10() -> usize {
    10
}
fn d_35() -> usize {
    35
}
fn d_65536() -> usize {
    64 * 1024
}
fn d_10_u64() -> u64 {
    10
}
fn d_100() -> u64 {
    100
}
fn d_1000() -> u64 {
    1_000
}
fn d_2000() -> u64 {
    2_000
}
fn d_3600() -> u64 {
    3_600
}
fn d_5000() -> u64 {
    5_000
}
fn d_6000() -> u64 {
    6_000
}
fn d_10000() -> u64 {
    10_000
}
