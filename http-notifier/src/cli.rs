use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use http_notifier::host::ServerConfig;
use http_notifier::logging::{LogFormat, LogOptions};

/// Delivers filtered, templated build events to an HTTP webhook.
#[derive(Parser, Debug)]
#[command(name = "http-notifier", version, about, long_about = None)]
pub struct Args {
    /// Notifier config file (YAML or JSON)
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: PathBuf,

    /// Address to listen on
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Seconds allowed for handling one event, delivery included
    #[arg(long, env = "DELIVERY_TIMEOUT_SECS", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub delivery_timeout_secs: u64,

    /// Maximum push request body size in bytes
    #[arg(long, env = "BODY_LIMIT", default_value_t = 1024 * 1024)]
    pub body_limit: usize,

    /// Log line format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Validate the config and template, then exit
    #[arg(long)]
    pub check: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            verbose: self.verbose,
            quiet: self.quiet,
            format: self.log_format,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.bind_address.clone(),
            port: self.port,
            body_limit: self.body_limit,
            delivery_timeout: Duration::from_secs(self.delivery_timeout_secs),
        }
    }
}
