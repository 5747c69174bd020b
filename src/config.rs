//! Operator configuration
//!
//! Every option can be given as a flag or through the environment, so the same
//! binary runs unchanged from a shell or a Deployment manifest.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Machine health check operator.
#[derive(Parser, Clone, Debug)]
#[command(name = "machine-health-operator")]
#[command(about = "Health-check Machines and their Nodes and remediate unhealthy ones")]
#[command(version)]
pub struct OperatorConfig {
    /// Only watch objects in this namespace (default: all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Address of the health, metrics and diagnostics server
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Seconds before retrying a pass that failed with a transient error
    #[arg(long, env = "RETRY_INTERVAL_SECS", default_value_t = 15)]
    pub retry_interval_secs: u64,

    /// Seconds before retrying a pass that failed with any other error
    #[arg(long, env = "ERROR_INTERVAL_SECS", default_value_t = 60)]
    pub error_interval_secs: u64,
}

impl OperatorConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn error_interval(&self) -> Duration {
        Duration::from_secs(self.error_interval_secs)
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Text,
            retry_interval_secs: 15,
            error_interval_secs: 60,
        }
    }
}
