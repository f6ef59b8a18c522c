//! Command-line arguments.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use wheelctl_core::{BridgeConfig, TransportConfig};

/// Bridge a steering wheel controller's serial stream to host actions.
#[derive(Parser, Debug, Clone)]
#[command(name = "wheelctl", version, author, long_about = None)]
pub struct Args {
    /// YAML configuration file (transport, controller tuning, buttons, dimmer)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Connect to this host:port instead of the configured transport
    #[arg(long)]
    pub connect: Option<String>,

    /// Start in learning mode: report raw clicks and dimmer changes instead of running actions
    #[arg(long, default_value_t = false)]
    pub learn: bool,

    /// Log filter, e.g. "debug" or "wheelctl_core=trace" (default: RUST_LOG, then "info")
    #[arg(long)]
    pub log_level: Option<String>,

    /// Delay before reconnecting after a failed attempt or a device error
    #[arg(long, default_value_t = 5000)]
    pub reconnect_delay_ms: u64,

    /// Serve Prometheus metrics on this address (needs the `prometheus` feature)
    #[arg(long)]
    pub metrics_listen: Option<SocketAddr>,
}

impl Args {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Apply command-line overrides to a loaded configuration.
    pub fn apply(&self, config: &mut BridgeConfig) {
        if let Some(address) = &self.connect {
            config.transport = TransportConfig::Tcp {
                address: address.clone(),
            };
        }
        if self.learn {
            config.controller.learning_mode = true;
        }
    }
}
