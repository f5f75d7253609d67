//! Certificate issuance subsystem.
//!
//! # Data Flow
//! ```text
//! Options.certificate (subject, key size)
//!     → authority.rs (root key + self-signed CA, leaf key + CA-signed leaf)
//!     → CertificateBundle
//!         → ServerIdentity (leaf chain + key) → net::tls server configs
//!         → TrustBundle (root only)           → net::tls client config
//! ```
//!
//! # Design Decisions
//! - One bundle per secure server start; never cached or written to disk
//! - Private keys are redacted from every `Debug` output

pub mod authority;

pub use authority::{
    CertificateAuthority, CertificateBundle, CertificateError, ServerIdentity, TrustBundle,
    LEAF_HOSTNAME,
};
