//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or Options::default() + builder methods
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Options (validated, immutable)
//!     → passed by reference to rpc::client / rpc::server
//! ```
//!
//! # Design Decisions
//! - Options are immutable once handed to a builder
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Selector resolution failures (unknown protocol) are configuration errors
//!   and surface before any I/O

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    Carrier, CertificateConfig, LimitsConfig, ObservabilityConfig, Options, TimeoutConfig,
};
pub use validation::{validate_options, ValidationError};
