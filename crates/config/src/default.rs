use crate::config::{HealthCheck, Listen, Log};

// default values
pub fn get_default_port() -> u32 {
    8080
}

pub fn get_default_address() -> String {
    String::from("0.0.0.0")
}

pub fn get_default_path() -> String {
    String::from("/health")
}

pub fn get_default_interval() -> u64 {
    10_000
}

pub fn get_default_health_timeout() -> u64 {
    5_000
}

pub fn get_default_log_level() -> String {
    String::from("info")
}

pub fn get_default_listen() -> Listen {
    Listen {
        port: get_default_port(),
        address: get_default_address(),
    }
}

pub fn get_default_health_check() -> HealthCheck {
    HealthCheck {
        path: get_default_path(),
        interval_ms: get_default_interval(),
        timeout_ms: get_default_health_timeout(),
    }
}

pub fn get_default_log() -> Log {
    Log {
        level: get_default_log_level(),
        file: None,
    }
}
