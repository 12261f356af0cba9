use log::{error, info, warn};
use url::Url;

use crate::config::Config;

pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

pub fn validate(config: &Config) -> bool {
    info!("Starting configuration validation...");

    // --- Validate log level ---
    if !VALID_LOG_LEVELS
        .iter()
        .any(|lvl| lvl.eq_ignore_ascii_case(&config.log.level))
    {
        error!("Invalid log level: {}", config.log.level);
        return false;
    }

    // --- Validate listen address ---
    if config.listen.address.is_empty() {
        error!("Listen address is empty");
        return false;
    }

    // --- Validate listen port ---
    if config.listen.port == 0 || config.listen.port > 65535 {
        error!(
            "Invalid listen port: {} (must be between 1 and 65535)",
            config.listen.port
        );
        return false;
    }

    // --- Validate health check ---
    if !config.health_check.path.starts_with('/') {
        error!(
            "Health check path must start with '/': {}",
            config.health_check.path
        );
        return false;
    }

    if config.health_check.interval_ms == 0 {
        error!("Health check interval is invalid (0)");
        return false;
    }

    if config.health_check.timeout_ms == 0 {
        error!("Health check timeout is invalid (0)");
        return false;
    }

    if config.health_check.timeout_ms > config.health_check.interval_ms {
        warn!(
            "Health check timeout ({} ms) exceeds the interval ({} ms); a slow backend is checked less often than configured",
            config.health_check.timeout_ms, config.health_check.interval_ms
        );
    }

    // --- Validate backends ---
    if config.backends.is_empty() {
        error!("No backends configured");
        return false;
    }

    for backend in &config.backends {
        match Url::parse(backend) {
            Ok(url) if url.host_str().is_some() => {}
            Ok(_) => {
                error!("Backend address has no host: '{}'", backend);
                return false;
            }
            Err(err) => {
                error!("Backend address '{}' is invalid: {}", backend, err);
                return false;
            }
        }
    }

    info!("Configuration validation passed successfully");

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default::{get_default_health_check, get_default_listen, get_default_log};

    fn config(backends: &[&str]) -> Config {
        Config {
            listen: get_default_listen(),
            backends: backends.iter().map(|b| b.to_string()).collect(),
            health_check: get_default_health_check(),
            log: get_default_log(),
        }
    }

    #[test]
    fn accepts_default_config_with_backends() {
        assert!(validate(&config(&["http://localhost:8081", "https://10.0.0.2:443"])));
    }

    #[test]
    fn rejects_empty_backend_list() {
        assert!(!validate(&config(&[])));
    }

    #[test]
    fn rejects_unparseable_backend() {
        assert!(!validate(&config(&["http://localhost:8081", "not a url"])));
    }

    #[test]
    fn rejects_backend_without_host() {
        assert!(!validate(&config(&["mailto:ops@example.com"])));
    }

    #[test]
    fn rejects_bad_port_and_level() {
        let mut cfg = config(&["http://localhost:8081"]);
        cfg.listen.port = 70000;
        assert!(!validate(&cfg));

        let mut cfg = config(&["http://localhost:8081"]);
        cfg.log.level = "loud".to_string();
        assert!(!validate(&cfg));
    }

    #[test]
    fn rejects_zero_interval_and_relative_path() {
        let mut cfg = config(&["http://localhost:8081"]);
        cfg.health_check.interval_ms = 0;
        assert!(!validate(&cfg));

        let mut cfg = config(&["http://localhost:8081"]);
        cfg.health_check.path = "health".to_string();
        assert!(!validate(&cfg));
    }

    #[test]
    fn accepts_timeout_longer_than_interval() {
        let mut cfg = config(&["http://localhost:8081"]);
        cfg.health_check.interval_ms = 100;
        cfg.health_check.timeout_ms = 3_000;
        assert!(validate(&cfg));
    }
}
