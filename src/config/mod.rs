use crate::core::{AppError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub mod database;
pub mod server;

pub use database::{DatabaseConfig, StorageBackend};
pub use server::ServerConfig;

use crate::modules::gateways::PaystackConfig;

/// Longest lifetime accepted for a credential setup link
pub const MAX_SETUP_LINK_TTL_HOURS: i64 = 24 * 365;

/// Source of raw configuration values; the process environment in production
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageBackend,
    pub database: Option<DatabaseConfig>,
    pub server: ServerConfig,
    pub paystack: PaystackSettings,
    pub enrollment: EnrollmentConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Unknown log format: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct PaystackSettings {
    pub secret_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub verify_retries: u32,
}

impl PaystackSettings {
    pub fn client_config(&self) -> PaystackConfig {
        PaystackConfig {
            secret_key: self.secret_key.clone(),
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            verify_retries: self.verify_retries,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrollmentConfig {
    pub payment_callback_url: Option<String>,
    pub matric_prefix: String,
    pub matric_width: usize,
    pub setup_link_base_url: String,
    pub setup_link_ttl_hours: i64,
    pub pricing_rules_path: String,
}

impl EnrollmentConfig {
    /// Setup link lifetime, bounded so expiry arithmetic cannot overflow
    pub fn setup_link_ttl(&self) -> Result<chrono::Duration> {
        if self.setup_link_ttl_hours <= 0 || self.setup_link_ttl_hours > MAX_SETUP_LINK_TTL_HOURS {
            return Err(AppError::Configuration(format!(
                "SETUP_LINK_TTL_HOURS must be between 1 and {}, got {}",
                MAX_SETUP_LINK_TTL_HOURS, self.setup_link_ttl_hours
            )));
        }
        Ok(chrono::Duration::hours(self.setup_link_ttl_hours))
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub rate_limit_per_minute: u32,
}

fn parse_or<T: FromStr>(lookup: Lookup, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Configuration(format!("Invalid {}", key))),
        None => Ok(default),
    }
}

fn string_or(lookup: Lookup, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn required(lookup: Lookup, key: &str) -> Result<String> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Configuration(format!("{} not set", key)))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: Lookup) -> Result<Self> {
        let storage: StorageBackend = string_or(lookup, "STORAGE_BACKEND", "mysql")
            .parse()
            .map_err(AppError::Configuration)?;

        let database = match storage {
            StorageBackend::MySql => Some(DatabaseConfig::from_lookup(lookup)?),
            StorageBackend::Memory => None,
        };

        let config = Config {
            app: AppConfig {
                env: string_or(lookup, "APP_ENV", "development"),
                log_level: string_or(lookup, "LOG_LEVEL", "info"),
                log_format: string_or(lookup, "LOG_FORMAT", "pretty")
                    .parse()
                    .map_err(AppError::Configuration)?,
            },
            storage,
            database,
            server: ServerConfig::from_lookup(lookup)?,
            paystack: PaystackSettings {
                secret_key: required(lookup, "PAYSTACK_SECRET_KEY")?,
                base_url: string_or(lookup, "PAYSTACK_BASE_URL", "https://api.paystack.co"),
                timeout_secs: parse_or(lookup, "PAYSTACK_TIMEOUT_SECS", 15)?,
                verify_retries: parse_or(lookup, "PAYSTACK_VERIFY_RETRIES", 2)?,
            },
            enrollment: EnrollmentConfig {
                payment_callback_url: lookup("PAYMENT_CALLBACK_URL").filter(|v| !v.is_empty()),
                matric_prefix: string_or(lookup, "MATRIC_PREFIX", "HF"),
                matric_width: parse_or(lookup, "MATRIC_WIDTH", 4)?,
                setup_link_base_url: required(lookup, "SETUP_LINK_BASE_URL")?,
                setup_link_ttl_hours: parse_or(lookup, "SETUP_LINK_TTL_HOURS", 72)?,
                pricing_rules_path: string_or(lookup, "PRICING_RULES_PATH", "config/pricing.yaml"),
            },
            security: SecurityConfig {
                rate_limit_per_minute: parse_or(lookup, "RATE_LIMIT_PER_MINUTE", 600)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.security.rate_limit_per_minute == 0 {
            return Err(AppError::Configuration(
                "Rate limit must be greater than 0".to_string(),
            ));
        }

        if self.paystack.timeout_secs == 0 {
            return Err(AppError::Configuration(
                "PAYSTACK_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        self.enrollment.setup_link_ttl()?;

        if self.enrollment.matric_prefix.trim().is_empty() || self.enrollment.matric_width == 0 {
            return Err(AppError::Configuration(
                "Matric prefix and width must be non-empty".to_string(),
            ));
        }

        if self.server.workers == 0 {
            return Err(AppError::Configuration(
                "SERVER_WORKERS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
