use super::{parse_or, Lookup};
use crate::core::Result;

/// Server configuration for HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Admin UI origin allowed by CORS; none means same-origin only
    pub cors_allowed_origin: Option<String>,
}

impl ServerConfig {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            workers: num_cpus::get() * 2, // 2x CPU cores for I/O-bound workload
            cors_allowed_origin: None,
        }
    }

    pub fn from_lookup(lookup: Lookup) -> Result<Self> {
        let mut config = Self::new(
            lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            parse_or(lookup, "SERVER_PORT", 8080)?,
        );
        config.workers = parse_or(lookup, "SERVER_WORKERS", config.workers)?;
        config.cors_allowed_origin = lookup("CORS_ALLOWED_ORIGIN").filter(|v| !v.is_empty());
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
