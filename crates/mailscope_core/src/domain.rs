//! In-memory domain and local-part heuristics

use crate::disposable::DisposableDetector;
use crate::heuristics::TypoDetector;
use crate::providers::{is_free_provider, is_role_account, is_trusted_provider};
use crate::types::{DomainAnalysis, ValidationResult};
use tracing::debug;

pub const DISPOSABLE_WEIGHT: u32 = 10;
pub const REPUTATION_WEIGHT: u32 = 10;

/// Neutral reputation for domains we know nothing about
const UNKNOWN_REPUTATION: u32 = 5;

pub struct DomainAnalyzer {
    disposable: DisposableDetector,
    typos: TypoDetector,
}

impl DomainAnalyzer {
    pub fn new(disposable: DisposableDetector, typos: TypoDetector) -> Self {
        Self { disposable, typos }
    }

    pub fn analyze(&self, local_part: &str, domain: &str) -> DomainAnalysis {
        let disposable = if self.disposable.is_disposable(domain) {
            ValidationResult::fail(DISPOSABLE_WEIGHT, "Domain is a disposable mail service", "disposable")
        } else {
            ValidationResult::pass(DISPOSABLE_WEIGHT, "Domain is not a known disposable service", "not_disposable")
        };

        let is_trusted = is_trusted_provider(domain);
        let typo_suggestion = if is_trusted { None } else { self.typos.check_typo(domain) };

        let reputation = match (&typo_suggestion, is_trusted) {
            (_, true) => ValidationResult::pass(REPUTATION_WEIGHT, "Well-known mailbox provider", "trusted_provider"),
            (Some(suggestion), false) => ValidationResult::fail(
                REPUTATION_WEIGHT,
                format!("Domain looks like a misspelling of {}", suggestion),
                format!("typo:{}", suggestion),
            ),
            (None, false) => ValidationResult::unknown(
                UNKNOWN_REPUTATION,
                REPUTATION_WEIGHT,
                "No reputation data for domain",
                "unknown",
            ),
        };

        let analysis = DomainAnalysis {
            disposable,
            reputation,
            is_free_provider: is_free_provider(domain),
            is_trusted_provider: is_trusted,
            is_role_account: is_role_account(local_part),
            typo_suggestion,
        };

        debug!(
            "Domain analysis for {}: disposable={}, trusted={}, role={}, typo={:?}",
            domain,
            !analysis.disposable.passed(),
            analysis.is_trusted_provider,
            analysis.is_role_account,
            analysis.typo_suggestion
        );

        analysis
    }

    pub fn disposable_count(&self) -> usize {
        self.disposable.domain_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CheckStatus;
    use pretty_assertions::assert_eq;

    fn analyzer() -> DomainAnalyzer {
        DomainAnalyzer::new(DisposableDetector::builtin(0.0001).unwrap(), TypoDetector::new())
    }

    #[test]
    fn test_trusted_provider() {
        let analysis = analyzer().analyze("jane", "gmail.com");

        assert_eq!(analysis.reputation.score, 10);
        assert_eq!(analysis.disposable.score, 10);
        assert!(analysis.is_free_provider);
        assert!(analysis.is_trusted_provider);
        assert!(!analysis.is_role_account);
        assert_eq!(analysis.typo_suggestion, None);
    }

    #[test]
    fn test_disposable_domain() {
        let analysis = analyzer().analyze("jane", "mailinator.com");

        assert_eq!(analysis.disposable.status, CheckStatus::Fail);
        assert_eq!(analysis.disposable.score, 0);
        assert_eq!(analysis.disposable.weight, DISPOSABLE_WEIGHT);
    }

    #[test]
    fn test_typo_domain() {
        let analysis = analyzer().analyze("jane", "gmai.com");

        assert_eq!(analysis.reputation.status, CheckStatus::Fail);
        assert_eq!(analysis.reputation.score, 0);
        assert_eq!(analysis.typo_suggestion, Some("gmail.com".to_string()));
        assert_eq!(analysis.reputation.raw_signal, "typo:gmail.com");
    }

    #[test]
    fn test_unknown_domain_role_account() {
        let analysis = analyzer().analyze("postmaster", "corp.example");

        assert_eq!(analysis.reputation.status, CheckStatus::Unknown);
        assert_eq!(analysis.reputation.score, UNKNOWN_REPUTATION);
        assert!(analysis.is_role_account);
        assert!(!analysis.is_free_provider);
    }
}
