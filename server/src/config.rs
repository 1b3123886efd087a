//! Command line configuration of the server binary.

use crate::session_manager::SessionConfig;
use clap::Parser;
use shared::{DEFAULT_PORT, MAX_SESSION_SIZE, STATE_BROADCAST_INTERVAL_MS};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Authoritative server for multiplayer typing races")]
pub struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of players in one session
    #[clap(short = 's', long, default_value_t = MAX_SESSION_SIZE)]
    pub max_session_size: usize,

    /// Interval between player state broadcasts, in milliseconds
    #[clap(short = 'i', long, default_value_t = STATE_BROADCAST_INTERVAL_MS)]
    pub broadcast_interval_ms: u64,

    /// Text file to race on; may be given several times
    #[clap(short = 't', long = "text-file")]
    pub text_files: Vec<PathBuf>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max session size must be at least 1")]
    ZeroSessionSize,

    #[error("broadcast interval must be at least 1 ms")]
    ZeroBroadcastInterval,
}

/// Settings the library runs with.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub session: SessionConfig,
    pub text_files: Vec<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{}", DEFAULT_PORT),
            session: SessionConfig::default(),
            text_files: Vec::new(),
        }
    }
}

impl Args {
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        if self.max_session_size == 0 {
            return Err(ConfigError::ZeroSessionSize);
        }
        if self.broadcast_interval_ms == 0 {
            return Err(ConfigError::ZeroBroadcastInterval);
        }

        Ok(ServerConfig {
            address: format!("{}:{}", self.host, self.port),
            session: SessionConfig {
                max_size: self.max_session_size,
                broadcast_interval: Duration::from_millis(self.broadcast_interval_ms),
            },
            text_files: self.text_files,
        })
    }
}
