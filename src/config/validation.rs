//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, timeouts > 0, supported key sizes)
//! - Check the HTTP path is routable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Options → Result<(), Vec<ValidationError>>
//! - Runs before any socket is opened

use std::fmt;

use crate::config::schema::Options;

/// RSA modulus sizes the certificate authority can generate.
pub const SUPPORTED_KEY_BITS: [u32; 3] = [2048, 3072, 4096];

/// A single semantic problem with an option set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every semantic rule and report all violations.
pub fn validate_options(options: &Options) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !options.http_path.starts_with('/') {
        errors.push(ValidationError::new("http_path", "must start with '/'"));
    }

    let limits = &options.limits;
    if limits.buffer_size == 0 {
        errors.push(ValidationError::new("limits.buffer_size", "must be greater than 0"));
    }
    if limits.max_frame_size == 0 || limits.max_frame_size > u32::MAX as usize {
        errors.push(ValidationError::new(
            "limits.max_frame_size",
            "must be between 1 and 4294967295",
        ));
    }
    if limits.max_message_size == 0 {
        errors.push(ValidationError::new(
            "limits.max_message_size",
            "must be greater than 0",
        ));
    }
    if limits.max_connections == 0 {
        errors.push(ValidationError::new(
            "limits.max_connections",
            "must be greater than 0",
        ));
    }

    if options.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if options.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let cert = &options.certificate;
    if !SUPPORTED_KEY_BITS.contains(&cert.key_bits) {
        errors.push(ValidationError::new(
            "certificate.key_bits",
            format!("{} is not one of {:?}", cert.key_bits, SUPPORTED_KEY_BITS),
        ));
    }
    if cert.organization.trim().is_empty() {
        errors.push(ValidationError::new("certificate.organization", "must not be empty"));
    }
    if cert.country.chars().count() != 2 {
        errors.push(ValidationError::new(
            "certificate.country",
            "must be a two-letter country code",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_options(&Options::default()).is_ok());
    }

    #[test]
    fn reports_every_violation() {
        let mut options = Options::default();
        options.http_path = "thrift".to_string();
        options.limits.buffer_size = 0;
        options.certificate.key_bits = 1024;
        options.certificate.country = "USA".to_string();

        let errors = validate_options(&options).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "http_path",
                "limits.buffer_size",
                "certificate.key_bits",
                "certificate.country"
            ]
        );
    }
}
