use serde::{Deserialize, Serialize};

use crate::default::{
    get_default_address, get_default_health_check, get_default_health_timeout,
    get_default_interval, get_default_listen, get_default_log, get_default_log_level,
    get_default_path, get_default_port,
};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default = "get_default_listen")]
    pub listen: Listen,

    // ordered; insertion order is the round-robin order
    pub backends: Vec<String>,

    #[serde(default = "get_default_health_check")]
    pub health_check: HealthCheck,

    #[serde(default = "get_default_log")]
    pub log: Log,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Listen {
    #[serde(default = "get_default_port")]
    pub port: u32, // 8080

    #[serde(default = "get_default_address")]
    pub address: String, // "0.0.0.0"
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct HealthCheck {
    #[serde(default = "get_default_path")]
    pub path: String, // "/health"

    #[serde(default = "get_default_interval")]
    pub interval_ms: u64,

    #[serde(default = "get_default_health_timeout")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Log {
    #[serde(default = "get_default_log_level")]
    pub level: String, // "trace, debug, info, warn, error, off"

    #[serde(default)]
    pub file: Option<String>,
}
