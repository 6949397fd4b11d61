//! # mailscope_core
//!
//! Concurrent validation engine that decides whether an email address's domain
//! can plausibly receive mail and how trustworthy its mail infrastructure is,
//! without ever sending a message.
//!
//! ## Features
//!
//! - **DNS validation** of domain existence and MX records via hickory-resolver
//! - **SPF/DMARC/DKIM analysis**, with DKIM discovered by racing 30+ selectors
//! - **SMTP reachability probing** raced across every MX host and submission port
//! - **Domain heuristics**: disposable detection (Bloom filter), typo suggestions,
//!   provider reputation and role accounts
//! - **TTL result cache** and per-address rate limiting owned by the engine
//!
//! ## Example
//!
//! ```rust,no_run
//! use mailscope_core::{Engine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(EngineConfig::default())?;
//!
//!     let result = engine.analyze("someone@example.com", true).await?;
//!     println!("score: {}/{}", result.score.total, result.score.max);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod disposable;
pub mod dns;
pub mod domain;
pub mod engine;
pub mod heuristics;
pub mod privacy;
pub mod providers;
pub mod race;
pub mod ratelimit;
pub mod resolver;
pub mod scoring;
pub mod security;
pub mod smtp;
pub mod syntax;
pub mod types;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream DNS service used by the production resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsProvider {
    Cloudflare,
    Google,
    Quad9,
}

/// Configuration for the validation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upstream DNS service
    pub dns_provider: DnsProvider,
    /// Per-query DNS timeout in milliseconds
    pub dns_timeout_ms: u64,
    /// Maximum number of DNS lookup attempts
    pub dns_attempts: usize,
    /// Resolver-level DNS cache size (number of entries)
    pub dns_cache_size: usize,
    /// Minimum TTL for positive DNS cache entries
    pub dns_min_ttl_secs: u64,
    /// Upper bound for any single validator lookup, in milliseconds
    pub dns_validation_timeout_ms: u64,
    /// Bloom filter false positive rate for disposable detection
    pub bloom_filter_fp_rate: f64,
    /// Optional file with additional disposable domains, one per line
    pub disposable_list_path: Option<String>,
    /// SMTP dial timeout in milliseconds
    pub smtp_dial_timeout_ms: u64,
    /// Deadline for a whole SMTP exchange in milliseconds
    pub smtp_exchange_timeout_ms: u64,
    /// Ports raced for every MX host
    pub smtp_ports: Vec<u16>,
    /// Port used by the connect-only fallback race
    pub smtp_fallback_port: u16,
    /// Name announced in EHLO
    pub smtp_helo_domain: String,
    /// Reverse path used in MAIL FROM
    pub smtp_mail_from: String,
    /// Report MX-bearing domains as reachable (12/20) when every probe fails
    pub assume_reachable_with_mx: bool,
    /// Result cache TTL in seconds; zero disables caching
    pub cache_ttl_secs: u64,
    /// Maximum number of cached results
    pub cache_max_entries: usize,
    /// Minimum interval between two analyses of one address, in milliseconds
    pub rate_limit_interval_ms: u64,
    /// Salt for the privacy fingerprint written to logs
    pub privacy_salt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dns_provider: DnsProvider::Cloudflare,
            dns_timeout_ms: 2_000,
            dns_attempts: 2,
            dns_cache_size: 10_000,
            dns_min_ttl_secs: 60,
            dns_validation_timeout_ms: 5_000,
            bloom_filter_fp_rate: 0.0001, // 0.01%
            disposable_list_path: None,
            smtp_dial_timeout_ms: 5_000,
            smtp_exchange_timeout_ms: 10_000,
            smtp_ports: vec![25, 587, 465, 2525],
            smtp_fallback_port: 25,
            smtp_helo_domain: "mailscope.local".to_string(),
            smtp_mail_from: "probe@mailscope.local".to_string(),
            assume_reachable_with_mx: true,
            cache_ttl_secs: 15 * 60,
            cache_max_entries: 10_000,
            rate_limit_interval_ms: 1_000,
            privacy_salt: None,
        }
    }
}

/// Errors surfaced by [`Engine::analyze`]
///
/// Network-level failures never appear here; they are folded into the
/// result's [`types::ValidationResult`] fields.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Rate limited: {email} was analyzed less than the minimum interval ago")]
    RateLimited { email: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

// Re-export main types
pub use engine::{Engine, EngineStats};
pub use resolver::{DnsLookup, HickoryResolver, LookupError};
pub use types::{
    CheckStatus, DnsValidationResult, DomainAnalysis, IntelligenceResult, MxRecord,
    SecurityAnalysisResult, SmtpValidationResult, ThreatLevel, ValidationResult,
};
