//! Email authentication analysis through SPF, DKIM, and DMARC records
//!
//! The three lookups are independent and always all awaited. DKIM has no
//! fixed location, so it is discovered by racing TXT lookups over a list of
//! well-known selectors and keeping the first valid key.

use crate::dns::{bounded, signal};
use crate::providers::{is_trusted_provider, DKIM_SELECTORS};
use crate::race::race;
use crate::resolver::DnsLookup;
use crate::types::{SecurityAnalysisResult, ThreatLevel, ValidationResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

pub const SPF_WEIGHT: u32 = 7;
pub const DMARC_WEIGHT: u32 = 7;
pub const DKIM_WEIGHT: u32 = 6;

/// Longest record excerpt kept as raw evidence
const SIGNAL_LIMIT: usize = 120;

/// Validator for SPF, DKIM, and DMARC records
pub struct SecurityValidator {
    resolver: Arc<dyn DnsLookup>,
    timeout: Duration,
    selectors: Vec<String>,
}

/// DKIM key found by the selector race
#[derive(Debug, Clone, PartialEq, Eq)]
struct DkimHit {
    selector: String,
    record: String,
}

impl SecurityValidator {
    pub fn new(resolver: Arc<dyn DnsLookup>, timeout: Duration) -> Self {
        Self {
            resolver,
            timeout,
            selectors: DKIM_SELECTORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the selector candidates
    pub fn with_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selectors = selectors.into_iter().map(Into::into).collect();
        self
    }

    #[instrument(skip(self))]
    pub async fn validate(&self, domain: &str) -> SecurityAnalysisResult {
        let (spf, dmarc, dkim) = tokio::join!(
            self.check_spf(domain),
            self.check_dmarc(domain),
            self.check_dkim(domain),
        );
        let (spf_record, spf_strict) = spf;
        let (dmarc_record, dmarc_policy) = dmarc;
        let (dkim_record, dkim_selector) = dkim;

        let security_score = spf_record.score + dkim_record.score + dmarc_record.score;
        let threat_level = ThreatLevel::from_score(security_score);

        debug!(
            "Security analysis for {}: spf={}, dmarc={}, dkim={}, score={}, threat={:?}",
            domain, spf_record.score, dmarc_record.score, dkim_record.score, security_score, threat_level
        );

        SecurityAnalysisResult {
            spf_record,
            dkim_record,
            dmarc_record,
            security_score,
            threat_level,
            spf_strict,
            dmarc_policy,
            dkim_selector,
        }
    }

    async fn check_spf(&self, domain: &str) -> (ValidationResult, bool) {
        let records = match bounded(self.timeout, self.resolver.lookup_txt(domain)).await {
            Ok(records) => records,
            Err(e) => {
                debug!("SPF lookup failed for {}: {}", domain, e);
                return (
                    ValidationResult::fail(SPF_WEIGHT, format!("No SPF record: {}", e), signal(&e)),
                    false,
                );
            }
        };

        match records.iter().find(|r| is_spf_record(r)) {
            Some(record) => {
                let strict = spf_is_strict(record);
                debug!("Found SPF record for {}: {}", domain, record);
                let reason = if strict {
                    "SPF record published with hard fail (-all)"
                } else {
                    "SPF record published"
                };
                (ValidationResult::pass(SPF_WEIGHT, reason, excerpt(record)), strict)
            }
            None => (
                ValidationResult::fail(SPF_WEIGHT, "No SPF record published", "no_spf"),
                false,
            ),
        }
    }

    async fn check_dmarc(&self, domain: &str) -> (ValidationResult, Option<String>) {
        let dmarc_domain = format!("_dmarc.{}", domain);
        let records = match bounded(self.timeout, self.resolver.lookup_txt(&dmarc_domain)).await {
            Ok(records) => records,
            Err(e) => {
                debug!("DMARC lookup failed for {}: {}", dmarc_domain, e);
                return (
                    ValidationResult::fail(DMARC_WEIGHT, format!("No DMARC record: {}", e), signal(&e)),
                    None,
                );
            }
        };

        match records.iter().find(|r| is_dmarc_record(r)) {
            Some(record) => {
                let policy = parse_tags(record).remove("p");
                debug!("DMARC policy for {}: {:?}", domain, policy);
                let reason = match &policy {
                    Some(p) => format!("DMARC record published with policy '{}'", p),
                    None => "DMARC record published".to_string(),
                };
                (ValidationResult::pass(DMARC_WEIGHT, reason, excerpt(record)), policy)
            }
            None => (
                ValidationResult::fail(DMARC_WEIGHT, "No DMARC record published", "no_dmarc"),
                None,
            ),
        }
    }

    async fn check_dkim(&self, domain: &str) -> (ValidationResult, Option<String>) {
        if is_trusted_provider(domain) {
            debug!("Skipping DKIM selector race for trusted provider {}", domain);
            return (
                ValidationResult::pass(DKIM_WEIGHT, "Trusted provider signs outbound mail", "trusted_provider"),
                None,
            );
        }

        let token = CancellationToken::new();
        let resolver = Arc::clone(&self.resolver);
        let timeout = self.timeout;
        let domain_owned = domain.to_string();

        let hit = race(self.selectors.clone(), &token, move |selector| {
            let resolver = Arc::clone(&resolver);
            let name = format!("{}._domainkey.{}", selector, domain_owned);
            async move {
                let records = bounded(timeout, resolver.lookup_txt(&name)).await.ok()?;
                let record = records.into_iter().find(|r| is_dkim_key(r))?;
                Some(DkimHit { selector, record })
            }
        })
        .await;

        match hit {
            Some(hit) => {
                debug!("Found DKIM key for {} under selector '{}'", domain, hit.selector);
                let result = ValidationResult::pass(
                    DKIM_WEIGHT,
                    format!("DKIM key published under selector '{}'", hit.selector),
                    format!("{}: {}", hit.selector, excerpt(&hit.record)),
                );
                (result, Some(hit.selector))
            }
            None => {
                debug!("No DKIM key found for {} across {} selectors", domain, self.selectors.len());
                (
                    ValidationResult::fail(
                        DKIM_WEIGHT,
                        format!("No DKIM key found across {} common selectors", self.selectors.len()),
                        "no_dkim",
                    ),
                    None,
                )
            }
        }
    }
}

fn is_spf_record(record: &str) -> bool {
    record.trim().to_ascii_lowercase().starts_with("v=spf1")
}

fn is_dmarc_record(record: &str) -> bool {
    record.trim().to_ascii_lowercase().starts_with("v=dmarc1")
}

/// `-all` terminates the record with a hard fail
fn spf_is_strict(record: &str) -> bool {
    record
        .split_whitespace()
        .last()
        .is_some_and(|term| term.eq_ignore_ascii_case("-all"))
}

/// A TXT record counts as a DKIM key when it carries non-empty public key
/// data (`p=` not immediately followed by `;`), or declares `v=DKIM1` or
/// `k=ed25519`.
pub(crate) fn is_dkim_key(record: &str) -> bool {
    let lower = record.to_ascii_lowercase();
    if lower.contains("v=dkim1") || lower.contains("k=ed25519") {
        return true;
    }
    lower.match_indices("p=").any(|(idx, _)| {
        let value = lower[idx + 2..].trim_start();
        !value.is_empty() && !value.starts_with(';')
    })
}

/// Parse `tag=value; tag=value` records into a key-value map
fn parse_tags(record: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();

    for part in record.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();
            tags.insert(key, value);
        }
    }

    tags
}

fn excerpt(record: &str) -> String {
    match record.char_indices().nth(SIGNAL_LIMIT) {
        Some((idx, _)) => format!("{}...", &record[..idx]),
        None => record.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::mock::MockResolver;
    use crate::types::CheckStatus;
    use pretty_assertions::assert_eq;

    fn validator(resolver: &Arc<MockResolver>) -> SecurityValidator {
        SecurityValidator::new(Arc::clone(resolver) as Arc<dyn DnsLookup>, Duration::from_millis(500))
    }

    #[test]
    fn test_dkim_key_detection() {
        assert!(is_dkim_key("v=DKIM1; k=rsa; p=MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQC"));
        assert!(is_dkim_key("k=rsa; p=MIGfMA0GCSqGSIb3"));
        assert!(is_dkim_key("k=ed25519; p="));
        assert!(is_dkim_key("v=DKIM1; p="));
        assert!(!is_dkim_key("k=rsa; p=;"));
        assert!(!is_dkim_key("k=rsa; p= ;"));
        assert!(!is_dkim_key("k=rsa; p="));
        assert!(!is_dkim_key("v=spf1 -all"));
    }

    #[test]
    fn test_spf_strictness() {
        assert!(spf_is_strict("v=spf1 include:_spf.google.com -all"));
        assert!(!spf_is_strict("v=spf1 include:_spf.google.com ~all"));
        assert!(!spf_is_strict("v=spf1 +all"));
    }

    #[test]
    fn test_tag_parsing() {
        let tags = parse_tags("v=DMARC1; p=reject; pct=100; rua=mailto:dmarc@example.com");
        assert_eq!(tags.get("v"), Some(&"DMARC1".to_string()));
        assert_eq!(tags.get("p"), Some(&"reject".to_string()));
        assert_eq!(tags.get("pct"), Some(&"100".to_string()));
        assert_eq!(tags.get("rua"), Some(&"mailto:dmarc@example.com".to_string()));
    }

    #[test]
    fn test_excerpt_truncates_long_records() {
        let long = "p=".to_string() + &"A".repeat(400);
        let short = excerpt(&long);
        assert!(short.ends_with("..."));
        assert_eq!(short.len(), SIGNAL_LIMIT + 3);
        assert_eq!(excerpt("v=spf1 -all"), "v=spf1 -all");
    }

    #[tokio::test]
    async fn test_spf_only_default_selector_dkim() {
        let resolver = Arc::new(MockResolver::new());
        resolver.add_txt("example.org", "google-site-verification=abc");
        resolver.add_txt("example.org", "v=spf1 include:_spf.example.net ~all");
        resolver.add_txt("default._domainkey.example.org", "v=DKIM1; k=rsa; p=MIIBIjANBgkq");

        let result = validator(&resolver).validate("example.org").await;

        assert_eq!(result.spf_record.score, 7);
        assert_eq!(result.dmarc_record.score, 0);
        assert_eq!(result.dmarc_record.status, CheckStatus::Fail);
        assert_eq!(result.dkim_record.score, 6);
        assert_eq!(result.security_score, 13);
        assert_eq!(result.threat_level, ThreatLevel::Medium);
        assert_eq!(result.dkim_selector, Some("default".to_string()));
        assert!(!result.spf_strict);
    }

    #[tokio::test]
    async fn test_full_marks() {
        let resolver = Arc::new(MockResolver::new());
        resolver.add_txt("secure.example", "v=spf1 mx -all");
        resolver.add_txt("_dmarc.secure.example", "v=DMARC1; p=reject; rua=mailto:d@secure.example");
        resolver.add_txt("selector2._domainkey.secure.example", "k=rsa; p=MIGfMA0GCSq");

        let result = validator(&resolver).validate("secure.example").await;

        assert_eq!(result.security_score, 20);
        assert_eq!(result.threat_level, ThreatLevel::Low);
        assert_eq!(result.dmarc_policy, Some("reject".to_string()));
        assert!(result.spf_strict);
        assert_eq!(result.dkim_selector, Some("selector2".to_string()));
    }

    #[tokio::test]
    async fn test_nothing_published() {
        let resolver = Arc::new(MockResolver::new());

        let result = validator(&resolver).validate("bare.example").await;

        assert_eq!(result.security_score, 0);
        assert_eq!(result.threat_level, ThreatLevel::High);
        assert_eq!(result.dkim_record.status, CheckStatus::Fail);
        assert_eq!(result.dkim_record.weight, DKIM_WEIGHT);
        // SPF + DMARC + every selector
        assert_eq!(resolver.calls(), 2 + DKIM_SELECTORS.len());
    }

    #[tokio::test]
    async fn test_revoked_key_does_not_count() {
        let resolver = Arc::new(MockResolver::new());
        resolver.add_txt("default._domainkey.revoked.example", "k=rsa; p=");

        let result = validator(&resolver).validate("revoked.example").await;
        assert_eq!(result.dkim_record.score, 0);
    }

    #[tokio::test]
    async fn test_trusted_provider_dkim_needs_no_lookups() {
        let resolver = Arc::new(MockResolver::new());

        let result = validator(&resolver).validate("gmail.com").await;

        assert_eq!(result.dkim_record.score, DKIM_WEIGHT);
        assert_eq!(result.dkim_record.raw_signal, "trusted_provider");
        let dkim_queries = resolver
            .queried()
            .into_iter()
            .filter(|name| name.contains("._domainkey."))
            .count();
        assert_eq!(dkim_queries, 0);
    }

    #[tokio::test]
    async fn test_custom_selectors() {
        let resolver = Arc::new(MockResolver::new());
        resolver.add_txt("corp2024._domainkey.corp.example", "v=DKIM1; p=MIIB");

        let result = validator(&resolver)
            .with_selectors(["corp2023", "corp2024"])
            .validate("corp.example")
            .await;

        assert_eq!(result.dkim_selector, Some("corp2024".to_string()));
    }
}
