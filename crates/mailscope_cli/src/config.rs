//! Configuration management for the mailscope CLI
//!
//! Settings are layered with figment: built-in defaults, then an optional
//! TOML file, then `MAILSCOPE_` environment variables. Nested keys use a
//! double underscore, e.g. `MAILSCOPE_SMTP__HELO_DOMAIN`.

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use mailscope_core::{DnsProvider, EngineConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "Mailscope.toml";

pub const ENV_PREFIX: &str = "MAILSCOPE_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub dns: DnsConfig,
    pub smtp: SmtpConfig,
    pub heuristics: HeuristicsConfig,
    pub cache: CacheConfig,
    pub observability: ObservabilityConfig,
}

/// Resolver and lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    pub provider: DnsProvider,
    /// Per-query timeout in milliseconds
    pub timeout_ms: u64,
    pub attempts: usize,
    /// Resolver record cache size (number of entries)
    pub cache_size: usize,
    pub min_ttl_secs: u64,
    /// Upper bound for a validator's lookup, in milliseconds
    pub validation_timeout_ms: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            provider: DnsProvider::Cloudflare,
            timeout_ms: 2_000,
            attempts: 2,
            cache_size: 10_000,
            min_ttl_secs: 60,
            validation_timeout_ms: 5_000,
        }
    }
}

/// SMTP probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub dial_timeout_ms: u64,
    pub exchange_timeout_ms: u64,
    pub ports: Vec<u16>,
    pub fallback_port: u16,
    pub helo_domain: String,
    pub mail_from: String,
    pub assume_reachable_with_mx: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            dial_timeout_ms: 5_000,
            exchange_timeout_ms: 10_000,
            ports: vec![25, 587, 465, 2525],
            fallback_port: 25,
            helo_domain: "mailscope.local".to_string(),
            mail_from: "probe@mailscope.local".to_string(),
            assume_reachable_with_mx: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicsConfig {
    pub bloom_filter_fp_rate: f64,
    /// Extra disposable domains, one per line
    pub disposable_list_path: Option<String>,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            bloom_filter_fp_rate: 0.0001, // 0.01%
            disposable_list_path: None,
        }
    }
}

/// Result cache and per-address rate limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Zero disables the cache
    pub ttl_secs: u64,
    pub max_entries: usize,
    /// Zero disables the limiter
    pub rate_limit_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 15 * 60,
            max_entries: 10_000,
            rate_limit_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable JSON structured logging
    pub json_logs: bool,
    /// Level applied to mailscope's own targets unless RUST_LOG is set
    pub log_level: String,
    /// Salt for the address fingerprints written to logs
    pub privacy_salt: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            log_level: "info".to_string(),
            privacy_salt: None,
        }
    }
}

impl AppConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            dns_provider: self.dns.provider,
            dns_timeout_ms: self.dns.timeout_ms,
            dns_attempts: self.dns.attempts,
            dns_cache_size: self.dns.cache_size,
            dns_min_ttl_secs: self.dns.min_ttl_secs,
            dns_validation_timeout_ms: self.dns.validation_timeout_ms,
            bloom_filter_fp_rate: self.heuristics.bloom_filter_fp_rate,
            disposable_list_path: self.heuristics.disposable_list_path.clone(),
            smtp_dial_timeout_ms: self.smtp.dial_timeout_ms,
            smtp_exchange_timeout_ms: self.smtp.exchange_timeout_ms,
            smtp_ports: self.smtp.ports.clone(),
            smtp_fallback_port: self.smtp.fallback_port,
            smtp_helo_domain: self.smtp.helo_domain.clone(),
            smtp_mail_from: self.smtp.mail_from.clone(),
            assume_reachable_with_mx: self.smtp.assume_reachable_with_mx,
            cache_ttl_secs: self.cache.ttl_secs,
            cache_max_entries: self.cache.max_entries,
            rate_limit_interval_ms: self.cache.rate_limit_interval_ms,
            privacy_salt: self.observability.privacy_salt.clone(),
        }
    }
}

/// Load configuration, failing if an explicitly named file is missing
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file {} does not exist", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
            }
        }
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    figment.extract().context("Invalid configuration")
}
