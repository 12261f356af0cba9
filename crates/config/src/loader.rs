use std::fs;

use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse YAML file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

pub fn read_config(filename: &str) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(filename).map_err(|source| ConfigError::Read {
        path: filename.to_string(),
        source,
    })?;

    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: filename.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_full_config() {
        let file = write_config(
            r#"
listen:
  address: "127.0.0.1"
  port: 9000
backends:
  - "http://localhost:8081"
  - "http://localhost:8082"
  - "http://localhost:8083"
health_check:
  path: "/status"
  interval_ms: 2000
  timeout_ms: 1000
log:
  level: debug
"#,
        );

        let config = read_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.listen.port, 9000);
        assert_eq!(config.listen.address, "127.0.0.1");
        assert_eq!(config.backends.len(), 3);
        assert_eq!(config.backends[0], "http://localhost:8081");
        assert_eq!(config.health_check.path, "/status");
        assert_eq!(config.health_check.interval_ms, 2000);
        assert_eq!(config.health_check.timeout_ms, 1000);
        assert_eq!(config.log.level, "debug");
        assert!(config.log.file.is_none());
    }

    #[test]
    fn missing_sections_use_defaults() {
        let file = write_config("backends: [\"http://localhost:8081\"]\n");

        let config = read_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.listen.port, 8080);
        assert_eq!(config.listen.address, "0.0.0.0");
        assert_eq!(config.health_check.path, "/health");
        assert_eq!(config.health_check.interval_ms, 10_000);
        assert_eq!(config.health_check.timeout_ms, 5_000);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_config("/nonexistent/flux.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let file = write_config("backends: [unterminated\n");
        let err = read_config(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
