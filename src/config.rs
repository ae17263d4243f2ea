//! # Configuration Management
//!
//! Centralized configuration for the framing transport.
//!
//! This module provides structured configuration for acceptors, connectors,
//! UDP monitors, frame limits and logging. The transport types themselves
//! take addresses and [`FrameLimits`] as plain arguments; [`NetworkConfig`]
//! is the host-facing layer that produces them.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Limits
//! - `max_frame_size` bounds every TCP frame body; larger announcements
//!   close the connection
//! - `max_datagram_size` sizes the UDP receive buffer; larger datagrams are
//!   truncated by the OS and then dropped by the length check

use crate::core::codec::{FrameCodec, LengthCodec, MarkedLengthCodec};
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::Level;

/// Max allowed frame body size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Largest UDP payload an IPv4 datagram can carry
pub const MAX_UDP_DATAGRAM: usize = 65_507;

/// Default UDP receive buffer size
pub const DEFAULT_DATAGRAM_SIZE: usize = 1024;

/// Ceiling for decompressed output
pub const MAX_DECOMPRESSION_SIZE: usize = 64 * 1024 * 1024;

/// Default listen backlog
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Main network configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Acceptor configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Connector configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// UDP monitor configuration
    #[serde(default)]
    pub udp: UdpConfig,

    /// Framing configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SOCKFRAME_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("SOCKFRAME_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(addr) = std::env::var("SOCKFRAME_CLIENT_LOCAL_ADDRESS") {
            config.client.local_address = Some(addr);
        }

        if let Ok(addr) = std::env::var("SOCKFRAME_UDP_ADDRESS") {
            config.udp.address = addr;
        }

        if let Ok(size) = std::env::var("SOCKFRAME_MAX_FRAME_SIZE") {
            config.transport.max_frame_size = size.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid SOCKFRAME_MAX_FRAME_SIZE: {e}"))
            })?;
        }

        if let Ok(size) = std::env::var("SOCKFRAME_MAX_DATAGRAM_SIZE") {
            config.udp.max_datagram_size = size.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid SOCKFRAME_MAX_DATAGRAM_SIZE: {e}"))
            })?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Frame limits handed to acceptors, connectors and monitors
    pub fn limits(&self) -> FrameLimits {
        FrameLimits {
            max_frame_size: self.transport.max_frame_size,
            max_datagram_size: self.udp.max_datagram_size,
        }
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.udp.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Size limits enforced by the transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Largest TCP frame body accepted from a peer
    pub max_frame_size: usize,
    /// Largest UDP datagram payload (header included) that is received whole
    pub max_datagram_size: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            max_datagram_size: DEFAULT_DATAGRAM_SIZE,
        }
    }
}

/// Acceptor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "127.0.0.1:9000")
    pub address: String,

    /// Listen backlog passed to `listen(2)`
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            backlog: DEFAULT_BACKLOG,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(e) = check_address("server", &self.address) {
            errors.push(e);
        }

        if self.backlog == 0 {
            errors.push("Listen backlog must be greater than 0".to_string());
        }

        errors
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.address)
    }
}

/// Connector configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote address to dial
    pub address: String,

    /// Fixed local endpoint to bind before dialing
    pub local_address: Option<String>,

    /// Disable send coalescing (TCP_NODELAY)
    pub nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            local_address: None,
            nodelay: true,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(e) = check_address("client", &self.address) {
            errors.push(e);
        }

        if let Some(local) = &self.local_address {
            if let Some(e) = check_address("client local", local) {
                errors.push(e);
            }
        }

        errors
    }

    /// Parsed remote address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.address)
    }

    /// Parsed local address, if one is configured
    pub fn local_socket_addr(&self) -> Result<Option<SocketAddr>> {
        self.local_address.as_deref().map(parse_addr).transpose()
    }
}

/// UDP monitor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Bind address
    pub address: String,

    /// Receive buffer size; bounds the largest datagram received whole
    pub max_datagram_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9001"),
            max_datagram_size: DEFAULT_DATAGRAM_SIZE,
        }
    }
}

impl UdpConfig {
    /// Validate UDP configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(e) = check_address("udp", &self.address) {
            errors.push(e);
        }

        if self.max_datagram_size == 0 {
            errors.push("Max datagram size cannot be 0".to_string());
        } else if self.max_datagram_size > MAX_UDP_DATAGRAM {
            errors.push(format!(
                "Max datagram size too large: {} bytes (maximum: {MAX_UDP_DATAGRAM})",
                self.max_datagram_size
            ));
        }

        errors
    }

    /// Parsed bind address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.address)
    }
}

/// Header codec selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    /// Big-endian length prefix of `header_width` bytes
    #[default]
    Length,
    /// One marker byte followed by a 2-byte big-endian length
    MarkedLength,
}

/// Framing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum allowed frame body size in bytes
    pub max_frame_size: usize,

    /// Header codec used for every connection unless overridden at admission
    pub codec: CodecKind,

    /// Width of the length prefix for the `length` codec (1, 2, 4 or 8)
    pub header_width: usize,

    /// Marker byte for the `marked_length` codec
    pub marker: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            codec: CodecKind::Length,
            header_width: 4,
            marker: MarkedLengthCodec::DEFAULT_MARKER,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size == 0 {
            errors.push("Max frame size cannot be 0".to_string());
        } else if self.max_frame_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_frame_size
            ));
        }

        if self.codec == CodecKind::Length && !matches!(self.header_width, 1 | 2 | 4 | 8) {
            errors.push(format!(
                "Invalid header width: {} (valid widths: 1, 2, 4, 8)",
                self.header_width
            ));
        }

        errors
    }

    /// Build the configured header codec
    pub fn build_codec(&self) -> Result<Arc<dyn FrameCodec>> {
        match self.codec {
            CodecKind::Length => Ok(Arc::new(LengthCodec::new(self.header_width)?)),
            CodecKind::MarkedLength => Ok(Arc::new(MarkedLengthCodec::new(self.marker))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to include the event target in output
    pub with_target: bool,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("sockframe"),
            log_level: Level::INFO,
            with_target: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

fn check_address(section: &str, address: &str) -> Option<String> {
    if address.is_empty() {
        Some(format!("The {section} address cannot be empty"))
    } else if address.parse::<SocketAddr>().is_err() {
        Some(format!(
            "Invalid {section} address format: '{address}' (expected format: '127.0.0.1:9000')"
        ))
    } else {
        None
    }
}

fn parse_addr(address: &str) -> Result<SocketAddr> {
    address
        .parse::<SocketAddr>()
        .map_err(|e| ProtocolError::ConfigError(format!("Invalid address '{address}': {e}")))
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
