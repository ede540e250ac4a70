// Copyright 2025 framewire developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// protocol corruption: a buffer shorter than a fixed or derived length
    #[error("data too short: expected {expected} bytes, found {actual}")]
    TooShort { expected: usize, actual: usize },

    /// protocol corruption: a header declares a body too small to exist
    #[error("invalid body length: {0}")]
    InvalidSize(u32),

    /// a frame larger than the configured (or representable) limit
    #[error("frame of {size} bytes exceeds the limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// a decoded checksum does not match the freshly computed one
    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(String),

    /// transport failures: open, read, write, close
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bind error: {0}")]
    Bind(String),

    /// the channel was never established or has already been closed
    #[error("connection is not established")]
    NotConnected,

    #[error("tls error: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    #[error("tls configuration error: {0}")]
    TlsConfig(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// marker error: the read buffer does not yet hold a complete frame
    #[error("incomplete frame")]
    Incomplete,
}

impl NetError {
    /// Whether this error indicates corrupt or non-conforming data rather
    /// than a transport problem. Data errors terminate one message exchange;
    /// the connection itself remains usable.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            NetError::TooShort { .. }
                | NetError::InvalidSize(_)
                | NetError::FrameTooLarge { .. }
                | NetError::ChecksumMismatch(_)
        )
    }
}
