//! Post-processing over a finished analysis: score breakdown, risk factors,
//! closed-form predictions and a quality report.
//!
//! Everything here is a pure function of an [`IntelligenceResult`]. The
//! engine fills the corresponding fields once all validators are done.

use crate::types::{CheckStatus, IntelligenceResult, ThreatLevel, ValidationResult};
use serde::{Deserialize, Serialize};

/// Score earned in one category against the weight available to it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: u32,
    pub weight: u32,
}

impl CategoryScore {
    fn from_checks(checks: &[&ValidationResult]) -> Self {
        checks.iter().fold(Self::default(), |acc, check| Self {
            score: acc.score + check.score,
            weight: acc.weight + check.weight,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub syntax: CategoryScore,
    pub dns: CategoryScore,
    pub security: CategoryScore,
    /// Zero weight when the SMTP probe did not run
    pub smtp: CategoryScore,
    pub domain: CategoryScore,
    pub total: u32,
    pub max: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=25 => RiskLevel::Low,
            26..=50 => RiskLevel::Medium,
            51..=75 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    /// Points this factor adds to the risk score
    pub severity: u32,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    /// 0-100
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MlPredictions {
    pub deliverability_probability: f64,
    pub fraud_probability: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Poor,
    #[default]
    Invalid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub tier: QualityTier,
    pub warnings: Vec<String>,
    pub suggestion: Option<String>,
}

pub fn score(result: &IntelligenceResult) -> ScoreBreakdown {
    let security = &result.security_analysis;
    let syntax = CategoryScore::from_checks(&[&result.syntax]);
    let dns = CategoryScore::from_checks(&[
        &result.dns_validation.domain_exists,
        &result.dns_validation.mx_records,
    ]);
    let security = CategoryScore::from_checks(&[
        &security.spf_record,
        &security.dkim_record,
        &security.dmarc_record,
    ]);
    let smtp = CategoryScore::from_checks(&[&result.smtp_validation.reachable]);
    let domain = CategoryScore::from_checks(&[
        &result.domain_analysis.disposable,
        &result.domain_analysis.reputation,
    ]);

    let categories = [syntax, dns, security, smtp, domain];
    let total: u32 = categories.iter().map(|c| c.score).sum();
    let max: u32 = categories.iter().map(|c| c.weight).sum();
    let percentage = if max == 0 {
        0.0
    } else {
        round(f64::from(total) * 100.0 / f64::from(max), 2)
    };

    ScoreBreakdown {
        syntax,
        dns,
        security,
        smtp,
        domain,
        total,
        max,
        percentage,
    }
}

pub fn assess_risk(result: &IntelligenceResult) -> RiskAnalysis {
    let mut factors = Vec::new();
    let mut add = |name: &str, severity: u32, description: String| {
        factors.push(RiskFactor {
            name: name.to_string(),
            severity,
            description,
        });
    };

    if !result.syntax.passed() {
        add("invalid_syntax", 100, result.syntax.reason.clone());
    } else {
        let analysis = &result.domain_analysis;

        if !result.dns_validation.mx_records.passed() {
            add("no_mx_records", 40, "Domain cannot receive mail".to_string());
        }
        if analysis.disposable.status == CheckStatus::Fail {
            add("disposable_domain", 35, "Address belongs to a disposable mail service".to_string());
        }
        if let Some(suggestion) = &analysis.typo_suggestion {
            add("possible_typo", 25, format!("Domain may be a misspelling of {}", suggestion));
        }

        let smtp = &result.smtp_validation.reachable;
        if smtp.weight > 0 {
            if smtp.status == CheckStatus::Fail {
                add("smtp_unreachable", 30, smtp.reason.clone());
            } else if smtp.score < smtp.weight {
                add("mailbox_unconfirmed", 10, smtp.reason.clone());
            }
        }

        match result.security_analysis.threat_level {
            ThreatLevel::High => add("weak_authentication", 15, "Domain publishes little or no SPF, DKIM or DMARC".to_string()),
            ThreatLevel::Medium => add("partial_authentication", 5, "Domain authentication is incomplete".to_string()),
            ThreatLevel::Low => {}
        }

        if analysis.is_role_account {
            add("role_account", 10, "Address belongs to a role rather than a person".to_string());
        }
        if analysis.is_free_provider {
            add("free_provider", 5, "Address is hosted by a free mailbox provider".to_string());
        }
    }

    let score = factors.iter().map(|f| f.severity).sum::<u32>().min(100);

    RiskAnalysis {
        score,
        level: RiskLevel::from_score(score),
        factors,
    }
}

pub fn predict(result: &IntelligenceResult) -> MlPredictions {
    if !result.syntax.passed() {
        return MlPredictions {
            deliverability_probability: 0.0,
            fraud_probability: 0.5,
            confidence: 1.0,
        };
    }

    let analysis = &result.domain_analysis;
    let mx = ratio(&result.dns_validation.mx_records);
    let security = f64::from(result.security_analysis.security_score) / 20.0;
    let reputation = ratio(&analysis.reputation);
    let disposable = flag(analysis.disposable.status == CheckStatus::Fail);
    let typo = flag(analysis.typo_suggestion.is_some());
    let role = flag(analysis.is_role_account);

    let smtp = &result.smtp_validation.reachable;
    let probed = smtp.weight > 0;
    // Without a probe, MX presence stands in for reachability
    let reachability = if probed { ratio(smtp) } else { mx * 0.6 };

    let deliverability = sigmoid(
        -3.0 + 3.0 * mx + 2.5 * reachability + 1.0 * security + 1.0 * reputation
            - 2.5 * disposable
            - 1.5 * typo,
    );
    let fraud = sigmoid(
        -2.5 + 3.0 * disposable + 2.0 * typo + 1.5 * (1.0 - security) + 1.0 * (1.0 - mx) + 0.5 * role
            - 1.0 * reputation,
    );

    let mut confidence = 0.5;
    if result.dns_validation.mx_records.passed() {
        confidence += 0.2;
    }
    if probed {
        confidence += 0.2;
    }
    if result.security_analysis.security_score > 0 {
        confidence += 0.05;
    }

    MlPredictions {
        deliverability_probability: round(deliverability, 4),
        fraud_probability: round(fraud, 4),
        confidence: round(confidence, 2),
    }
}

pub fn assess_quality(result: &IntelligenceResult) -> QualityReport {
    let analysis = &result.domain_analysis;
    let mut warnings = Vec::new();

    if !result.syntax.passed() {
        warnings.push(format!("Invalid address: {}", result.syntax.reason));
        return QualityReport {
            tier: QualityTier::Invalid,
            warnings,
            suggestion: None,
        };
    }

    let has_mx = result.dns_validation.mx_records.passed();
    if !has_mx {
        warnings.push("Domain has no MX records".to_string());
    }
    let disposable = analysis.disposable.status == CheckStatus::Fail;
    if disposable {
        warnings.push("Disposable mail service".to_string());
    }
    if analysis.is_role_account {
        warnings.push("Role account".to_string());
    }
    if let Some(suggestion) = &analysis.typo_suggestion {
        warnings.push(format!("Did you mean {}?", suggestion));
    }
    let smtp = &result.smtp_validation.reachable;
    if smtp.weight > 0 && smtp.score < smtp.weight {
        warnings.push(format!("SMTP: {}", smtp.reason));
    }
    if !result.security_analysis.dmarc_record.passed() {
        warnings.push("No DMARC policy".to_string());
    }

    let tier = if !has_mx {
        QualityTier::Invalid
    } else {
        let by_score = match result.score.percentage {
            p if p >= 90.0 => QualityTier::Excellent,
            p if p >= 75.0 => QualityTier::Good,
            p if p >= 50.0 => QualityTier::Fair,
            _ => QualityTier::Poor,
        };
        if disposable {
            QualityTier::Poor
        } else {
            by_score
        }
    };

    QualityReport {
        tier,
        warnings,
        suggestion: analysis
            .typo_suggestion
            .as_ref()
            .map(|domain| format!("{}@{}", local_part(&result.email), domain)),
    }
}

fn local_part(email: &str) -> &str {
    email.rsplit_once('@').map_or(email, |(local, _)| local)
}

fn ratio(check: &ValidationResult) -> f64 {
    if check.weight == 0 {
        0.0
    } else {
        f64::from(check.score) / f64::from(check.weight)
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn round(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
