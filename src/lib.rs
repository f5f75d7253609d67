//! Thrift-style RPC endpoints.
//!
//! Builds clients and servers from a small set of options: wire protocol
//! (binary, compact, JSON, simple JSON), buffering, framing, TLS and carrier
//! (raw socket or HTTP). Secure servers present a freshly issued certificate
//! chain rooted in an ephemeral authority.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pki;
pub mod protocol;
pub mod rpc;
pub mod transport;

pub use config::{Carrier, Options};
pub use error::Error;
pub use lifecycle::{ServerState, Shutdown};
pub use pki::{CertificateAuthority, CertificateBundle, TrustBundle};
pub use protocol::{ProtocolKind, ProtocolRegistry};
pub use rpc::{connect, serve, Client, ClientBuilder, Closer, Processor, Server};
pub use transport::TransportRegistry;
