//! Validation engine orchestrating every check for one address
//!
//! Order of work: cache lookup, rate limit, syntax, then DNS, security and
//! domain heuristics concurrently, then the SMTP probe when requested and
//! MX records exist, and finally the scoring collaborators.

use crate::cache::ResultCache;
use crate::disposable::DisposableDetector;
use crate::dns::DnsValidator;
use crate::domain::DomainAnalyzer;
use crate::heuristics::TypoDetector;
use crate::privacy::Fingerprinter;
use crate::ratelimit::AddressLimiter;
use crate::resolver::{DnsLookup, HickoryResolver};
use crate::scoring::{self, MlPredictions, QualityReport, RiskAnalysis, ScoreBreakdown};
use crate::security::SecurityValidator;
use crate::smtp::{SmtpSettings, SmtpValidator, IMPLICIT_TLS_PORT};
use crate::syntax::check_syntax;
use crate::types::{
    DnsValidationResult, DomainAnalysis, IntelligenceResult, SecurityAnalysisResult,
    SmtpValidationResult,
};
use crate::{AnalysisError, EngineConfig, Result};
use anyhow::Context;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, instrument, warn, Span};

/// Sweep period used when the result cache is disabled
const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Entry point for address analysis
///
/// Cloning is cheap; clones share the cache and rate limiter.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    dns: DnsValidator,
    security: SecurityValidator,
    smtp: SmtpValidator,
    domains: DomainAnalyzer,
    cache: ResultCache<IntelligenceResult>,
    limiter: AddressLimiter,
    fingerprints: Fingerprinter,
}

/// Snapshot of the engine's long-lived state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub cached_results: usize,
    pub rate_limited_keys: usize,
    pub disposable_domains: usize,
}

impl Engine {
    /// Build an engine backed by the hickory resolver
    pub fn new(config: EngineConfig) -> Result<Self> {
        let resolver = HickoryResolver::new(
            config.dns_provider,
            config.dns_timeout_ms,
            config.dns_attempts,
            config.dns_cache_size,
            config.dns_min_ttl_secs,
        )
        .map_err(configuration)?;

        Self::with_resolver(config, Arc::new(resolver))
    }

    /// Build an engine on top of any resolver
    pub fn with_resolver(config: EngineConfig, resolver: Arc<dyn DnsLookup>) -> Result<Self> {
        info!("Initializing validation engine");

        let inner = EngineInner::build(&config, resolver).map_err(configuration)?;
        let engine = Self {
            inner: Arc::new(inner),
        };
        engine.spawn_sweeper();

        info!("Validation engine initialized successfully");
        Ok(engine)
    }

    /// Analyze one address
    ///
    /// The only error is [`AnalysisError::RateLimited`]; network failures are
    /// reported inside the result.
    #[instrument(skip(self, email), fields(address = tracing::field::Empty, deep = deep_analysis))]
    pub async fn analyze(&self, email: &str, deep_analysis: bool) -> Result<IntelligenceResult> {
        let inner = &self.inner;
        let started = Instant::now();
        let email = email.trim().to_lowercase();
        Span::current().record("address", inner.fingerprints.fingerprint(&email).as_str());

        if let Some(cached) = inner.cache.get(&email) {
            debug!("Returning cached result");
            return Ok(cached);
        }

        if !inner.limiter.check(&email) {
            warn!("Request rejected by rate limiter");
            return Err(AnalysisError::RateLimited { email });
        }

        let syntax = check_syntax(&email);
        if !syntax.is_valid() {
            debug!("Short-circuiting on invalid syntax");
            let mut result = blank_result(email, syntax.domain, deep_analysis);
            result.syntax = syntax.result;
            return Ok(finalize(result, started));
        }

        let domain = syntax.domain.clone();
        let (dns_validation, security_analysis, domain_analysis) = tokio::join!(
            inner.dns.validate(&domain),
            inner.security.validate(&domain),
            async { inner.domains.analyze(&syntax.local_part, &domain) },
        );

        let smtp_validation = if deep_analysis && !dns_validation.mx_details.is_empty() {
            inner.smtp.validate(&email, &dns_validation.mx_details).await
        } else {
            debug!("SMTP probe skipped (deep={}, mx={})", deep_analysis, dns_validation.mx_details.len());
            SmtpValidationResult::default()
        };

        let mut result = blank_result(email.clone(), domain, deep_analysis);
        result.syntax = syntax.result;
        result.dns_validation = dns_validation;
        result.security_analysis = security_analysis;
        result.domain_analysis = domain_analysis;
        result.smtp_validation = smtp_validation;
        let result = finalize(result, started);

        info!(
            "Analysis complete: score {}/{}, risk {:?}, {} ms",
            result.score.total, result.score.max, result.risk.level, result.duration_ms
        );

        inner.cache.insert(email, result.clone());
        Ok(result)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cached_results: self.inner.cache.len(),
            rate_limited_keys: self.inner.limiter.tracked_keys(),
            disposable_domains: self.inner.domains.disposable_count(),
        }
    }

    /// Periodically drop expired cache entries and idle limiter keys
    ///
    /// The task holds only a weak reference and ends with the last engine
    /// clone. Without a runtime (or with nothing to sweep) no task is spawned.
    fn spawn_sweeper(&self) {
        if !self.inner.cache.is_enabled() && !self.inner.limiter.is_enabled() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No tokio runtime, cache sweeper not started");
            return;
        };

        let period = if self.inner.cache.is_enabled() {
            self.inner.cache.ttl().saturating_mul(2)
        } else {
            DEFAULT_SWEEP_PERIOD
        };
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);

        handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let purged = inner.cache.purge_expired();
                inner.limiter.prune();
                debug!("Sweep removed {} cache entries", purged);
            }
        });
    }
}

impl EngineInner {
    fn build(config: &EngineConfig, resolver: Arc<dyn DnsLookup>) -> anyhow::Result<Self> {
        let lookup_timeout = Duration::from_millis(config.dns_validation_timeout_ms);

        let disposable = match &config.disposable_list_path {
            Some(path) => DisposableDetector::with_list_file(path, config.bloom_filter_fp_rate),
            None => DisposableDetector::builtin(config.bloom_filter_fp_rate),
        }
        .context("Failed to initialize disposable detector")?;

        let smtp = SmtpValidator::new(SmtpSettings {
            dial_timeout: Duration::from_millis(config.smtp_dial_timeout_ms),
            exchange_timeout: Duration::from_millis(config.smtp_exchange_timeout_ms),
            ports: config.smtp_ports.clone(),
            fallback_port: config.smtp_fallback_port,
            implicit_tls_port: IMPLICIT_TLS_PORT,
            helo_domain: config.smtp_helo_domain.clone(),
            mail_from: config.smtp_mail_from.clone(),
            assume_reachable_with_mx: config.assume_reachable_with_mx,
        })
        .context("Failed to initialize SMTP validator")?;

        let fingerprints = match &config.privacy_salt {
            Some(salt) => Fingerprinter::new(salt.as_bytes()),
            None => Fingerprinter::with_random_salt(),
        };

        Ok(Self {
            dns: DnsValidator::new(Arc::clone(&resolver), lookup_timeout),
            security: SecurityValidator::new(resolver, lookup_timeout),
            smtp,
            domains: DomainAnalyzer::new(disposable, TypoDetector::new()),
            cache: ResultCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_max_entries,
            ),
            limiter: AddressLimiter::new(Duration::from_millis(config.rate_limit_interval_ms)),
            fingerprints,
        })
    }
}

fn configuration(err: anyhow::Error) -> AnalysisError {
    AnalysisError::Configuration(format!("{:#}", err))
}

fn blank_result(email: String, domain: String, deep_analysis: bool) -> IntelligenceResult {
    IntelligenceResult {
        email,
        domain,
        syntax: Default::default(),
        dns_validation: DnsValidationResult::default(),
        security_analysis: SecurityAnalysisResult::default(),
        domain_analysis: DomainAnalysis::default(),
        smtp_validation: SmtpValidationResult::default(),
        score: ScoreBreakdown::default(),
        risk: RiskAnalysis::default(),
        predictions: MlPredictions::default(),
        quality: QualityReport::default(),
        deep_analysis,
        analyzed_at: SystemTime::now(),
        duration_ms: 0,
    }
}

/// Run the collaborators and stamp the duration
fn finalize(mut result: IntelligenceResult, started: Instant) -> IntelligenceResult {
    result.score = scoring::score(&result);
    result.risk = scoring::assess_risk(&result);
    result.predictions = scoring::predict(&result);
    result.quality = scoring::assess_quality(&result);
    result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    result
}
