//! Configuration schema definitions.
//!
//! This module defines the option set shared by the client and server
//! builders. All types derive Serde traits for deserialization from config
//! files; every section has defaults so a minimal file is valid.

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolKind;

/// Root option set for a client or server endpoint.
///
/// Client and server interoperate only when `protocol`, `buffered`, `framed`,
/// `secure` and `carrier` match.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Options {
    /// Wire encoding.
    pub protocol: ProtocolKind,

    /// Wrap the stream with fixed-size read/write buffers.
    pub buffered: bool,

    /// Add 4-byte length-prefix framing on top of the buffering choice.
    pub framed: bool,

    /// TLS with a freshly issued certificate.
    pub secure: bool,

    /// Raw socket or HTTP(S).
    pub carrier: Carrier,

    /// URL path served and requested by the HTTP carrier.
    pub http_path: String,

    pub limits: LimitsConfig,

    pub timeouts: TimeoutConfig,

    /// Subject and key size of issued certificates.
    pub certificate: CertificateConfig,

    pub observability: ObservabilityConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            protocol: ProtocolKind::Binary,
            buffered: true,
            framed: false,
            secure: false,
            carrier: Carrier::Socket,
            http_path: "/thrift".to_string(),
            limits: LimitsConfig::default(),
            timeouts: TimeoutConfig::default(),
            certificate: CertificateConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Options {
    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_buffered(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    pub fn with_framed(mut self, framed: bool) -> Self {
        self.framed = framed;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_carrier(mut self, carrier: Carrier) -> Self {
        self.carrier = carrier;
        self
    }

    pub fn with_http_path(mut self, path: impl Into<String>) -> Self {
        self.http_path = path.into();
        self
    }
}

/// Listener and transport type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Carrier {
    /// Thrift transports directly over TCP (or TLS over TCP).
    #[default]
    Socket,
    /// One HTTP POST per message.
    Http,
}

/// Buffer and size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Capacity of buffered transports in bytes.
    pub buffer_size: usize,

    /// Largest accepted frame payload on framed transports.
    pub max_frame_size: usize,

    /// Largest accepted message (and HTTP body).
    pub max_message_size: usize,

    /// Maximum concurrent connections on the raw-socket carrier (backpressure).
    pub max_connections: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 16 * 1024 * 1024,
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment (including TLS and HTTP handshakes) in seconds.
    pub connect_secs: u64,

    /// HTTP carrier request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 30,
        }
    }
}

/// Subject fields and key size for issued certificates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CertificateConfig {
    pub organization: String,
    pub country: String,
    pub province: String,
    pub locality: String,

    /// RSA modulus size: 2048, 3072 or 4096.
    pub key_bits: u32,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            organization: "Skyramp, Inc.".to_string(),
            country: "US".to_string(),
            province: "CA".to_string(),
            locality: "San Francisco".to_string(),
            key_bits: 4096,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
