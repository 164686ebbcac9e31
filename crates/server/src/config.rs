use std::env;

use chess_session::transport::HubConfig;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    /// Relay protocol (line-delimited JSON over TCP)
    pub port: u16,
    /// Read-only HTTP inspection API
    pub http_port: u16,
    pub history_limit: usize,
    pub channel_capacity: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = HubConfig::default();
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7878),
            http_port: env::var("HTTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7879),
            history_limit: positive(env::var("HISTORY_LIMIT").ok()).unwrap_or(defaults.history_limit),
            channel_capacity: positive(env::var("CHANNEL_CAPACITY").ok()).unwrap_or(defaults.channel_capacity),
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            history_limit: self.history_limit,
            channel_capacity: self.channel_capacity,
        }
    }
}

/// A positive count; zero and garbage fall back to the default.
fn positive(value: Option<String>) -> Option<usize> {
    value
        .and_then(|v| v.trim().parse().ok())
        .filter(|v: &usize| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_counts_only() {
        assert_eq!(positive(Some("64".into())), Some(64));
        assert_eq!(positive(Some("0".into())), None);
        assert_eq!(positive(Some("-3".into())), None);
        assert_eq!(positive(None), None);
    }
}
