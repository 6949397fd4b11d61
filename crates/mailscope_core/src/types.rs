//! Result types produced by the validators and assembled by the engine

use crate::scoring::{MlPredictions, QualityReport, RiskAnalysis, ScoreBreakdown};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Outcome of a single check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    #[default]
    Unknown,
}

/// Scored outcome of one check.
///
/// `weight` is fixed per check type whatever the outcome, and `score` never
/// exceeds it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: CheckStatus,
    pub reason: String,
    /// Machine-readable evidence (record text, reply line) or a fixed sentinel
    pub raw_signal: String,
    pub score: u32,
    pub weight: u32,
}

impl ValidationResult {
    /// Passing check with full credit
    pub fn pass(weight: u32, reason: impl Into<String>, raw_signal: impl Into<String>) -> Self {
        Self::scored(CheckStatus::Pass, weight, weight, reason, raw_signal)
    }

    /// Passing check with partial credit
    pub fn partial(
        score: u32,
        weight: u32,
        reason: impl Into<String>,
        raw_signal: impl Into<String>,
    ) -> Self {
        Self::scored(CheckStatus::Pass, score, weight, reason, raw_signal)
    }

    /// Failed check, no credit
    pub fn fail(weight: u32, reason: impl Into<String>, raw_signal: impl Into<String>) -> Self {
        Self::scored(CheckStatus::Fail, 0, weight, reason, raw_signal)
    }

    /// Inconclusive check
    pub fn unknown(
        score: u32,
        weight: u32,
        reason: impl Into<String>,
        raw_signal: impl Into<String>,
    ) -> Self {
        Self::scored(CheckStatus::Unknown, score, weight, reason, raw_signal)
    }

    fn scored(
        status: CheckStatus,
        score: u32,
        weight: u32,
        reason: impl Into<String>,
        raw_signal: impl Into<String>,
    ) -> Self {
        Self {
            status,
            reason: reason.into(),
            raw_signal: raw_signal.into(),
            score: score.min(weight),
            weight,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Pass
    }
}

/// Mail exchanger for a domain
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MxRecord {
    // Field order matters for the derived ordering: priority first.
    pub priority: u16,
    pub host: String,
}

impl MxRecord {
    pub fn new(priority: u16, host: impl AsRef<str>) -> Self {
        Self {
            priority,
            host: host.as_ref().trim_end_matches('.').to_ascii_lowercase(),
        }
    }
}

/// DNS existence and MX analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsValidationResult {
    /// Informational only, weight 0
    pub domain_exists: ValidationResult,
    pub mx_records: ValidationResult,
    pub a_records: Vec<String>,
    /// Sorted ascending by priority
    pub mx_details: Vec<MxRecord>,
    pub response_time_ms: u64,
}

/// Threat level derived from the security score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreatLevel {
    Low,
    Medium,
    #[default]
    High,
}

impl ThreatLevel {
    pub fn from_score(security_score: u32) -> Self {
        if security_score >= 15 {
            ThreatLevel::Low
        } else if security_score >= 7 {
            ThreatLevel::Medium
        } else {
            ThreatLevel::High
        }
    }
}

/// SPF, DKIM and DMARC analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityAnalysisResult {
    pub spf_record: ValidationResult,
    pub dkim_record: ValidationResult,
    pub dmarc_record: ValidationResult,
    /// Sum of the three scores, 0-20
    pub security_score: u32,
    pub threat_level: ThreatLevel,
    /// SPF record ends with a hard fail (`-all`)
    pub spf_strict: bool,
    /// DMARC `p=` policy, if a record was found
    pub dmarc_policy: Option<String>,
    /// Selector under which a DKIM key was found
    pub dkim_selector: Option<String>,
}

/// SMTP reachability analysis; the default value means "not probed"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpValidationResult {
    pub reachable: ValidationResult,
    pub response_time_ms: u64,
    pub server_response: String,
    pub port: u16,
    pub tls_supported: bool,
}

/// Domain and local-part heuristics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainAnalysis {
    pub disposable: ValidationResult,
    pub reputation: ValidationResult,
    pub is_free_provider: bool,
    pub is_trusted_provider: bool,
    pub is_role_account: bool,
    pub typo_suggestion: Option<String>,
}

/// Everything the engine learned about one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceResult {
    pub email: String,
    pub domain: String,
    pub syntax: ValidationResult,
    pub dns_validation: DnsValidationResult,
    pub security_analysis: SecurityAnalysisResult,
    pub domain_analysis: DomainAnalysis,
    pub smtp_validation: SmtpValidationResult,
    pub score: ScoreBreakdown,
    pub risk: RiskAnalysis,
    pub predictions: MlPredictions,
    pub quality: QualityReport,
    pub deep_analysis: bool,
    pub analyzed_at: SystemTime,
    pub duration_ms: u64,
}
