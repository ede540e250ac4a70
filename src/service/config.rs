use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::network::{
    ConnectionLimits, DEFAULT_BACKLOG, DEFAULT_MAX_FRAME_SIZE, DEFAULT_READ_BUFFER_SIZE,
};
use crate::{NetError, NetResult};

/// Bind address and connection bounds for a [`Server`](crate::Server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind to.
    pub ip: String,
    /// Port to bind to; 0 picks a free port.
    pub port: u16,
    /// Queue depth for established-but-not-yet-accepted connections.
    pub backlog: u32,
    /// Largest body a received frame may declare.
    pub max_frame_size: usize,
    /// Initial per-connection read buffer capacity.
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            ip: "127.0.0.1".to_string(),
            port: 0,
            backlog: DEFAULT_BACKLOG,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Loads a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> NetResult<ServerConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or_else(|| {
                NetError::InvalidValue(format!(
                    "config file path: {}",
                    path.as_ref().to_string_lossy()
                ))
            })?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            read_buffer_size: self.read_buffer_size,
            max_frame_size: self.max_frame_size,
        }
    }
}
