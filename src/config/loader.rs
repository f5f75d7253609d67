//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::Options;
use crate::config::validation::{validate_options, ValidationError};

/// Error type for configuration loading and option resolution.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
    /// The encoding selector is not known to the registry in use.
    UnknownProtocol(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            ConfigError::UnknownProtocol(name) => write!(f, "unknown protocol: {}", name),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Load and validate options from a TOML file.
pub fn load_config(path: &Path) -> Result<Options, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let options: Options = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_options(&options).map_err(ConfigError::Validation)?;

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Carrier;
    use crate::protocol::ProtocolKind;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_valid_file() {
        let path = write_temp(
            "thrift-stack-valid",
            r#"
            protocol = "json"
            secure = true
            carrier = "http"
            http_path = "/rpc"
            "#,
        );
        let options = load_config(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(options.protocol, ProtocolKind::Json);
        assert!(options.secure);
        assert_eq!(options.carrier, Carrier::Http);
        assert_eq!(options.http_path, "/rpc");
    }

    #[test]
    fn rejects_invalid_values() {
        let path = write_temp("thrift-stack-invalid", "[limits]\nbuffer_size = 0\n");
        let err = load_config(&path).unwrap_err();
        fs::remove_file(&path).ok();

        match err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "limits.buffer_size");
            }
            other => panic!("expected validation error, got {}", other),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/thrift-stack.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn unknown_protocol_is_reported_by_name() {
        let err = ConfigError::UnknownProtocol("msgpack".to_string());
        assert_eq!(err.to_string(), "unknown protocol: msgpack");
    }
}
