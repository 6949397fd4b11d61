//! Typo detection against major mailbox providers using Levenshtein distance

use std::collections::HashSet;
use textdistance::str::levenshtein;
use tracing::debug;

/// Provider names (second-level label only) that typos are matched against,
/// in preference order for equal distances
const MAJOR_PROVIDERS: &[&str] = &[
    "gmail", "googlemail", "outlook", "hotmail", "live", "yahoo", "ymail",
    "rocketmail", "icloud", "protonmail", "proton", "tutanota", "fastmail",
    "zoho", "zohomail", "yandex", "aol", "gmx", "orange", "laposte",
    "libero", "naver", "rediffmail", "comcast", "verizon",
];

/// Top-level labels accepted in a suggestion
const VALID_TLDS: &[&str] = &[
    "com", "org", "net", "edu", "gov", "info", "biz", "io", "co", "me",
    "us", "uk", "ca", "au", "de", "fr", "it", "es", "nl", "be", "ch", "at",
    "se", "no", "dk", "fi", "pl", "cz", "ru", "jp", "kr", "cn", "in", "br",
    "mx", "ar", "za", "ie", "pt", "nz", "co.uk", "com.au", "com.br", "co.jp",
];

/// Providers shorter than this are too close to ordinary words to match on
const MIN_PROVIDER_LEN: usize = 3;

pub struct TypoDetector {
    providers: Vec<String>,
    valid_tlds: HashSet<String>,
}

impl TypoDetector {
    pub fn new() -> Self {
        Self::with_lists(MAJOR_PROVIDERS.iter().copied(), VALID_TLDS.iter().copied())
    }

    /// Detector over custom provider names and top-level labels
    pub fn with_lists<P, T>(providers: P, tlds: T) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        let providers: Vec<String> = providers
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .filter(|p| p.len() >= MIN_PROVIDER_LEN)
            .collect();
        let valid_tlds: HashSet<String> = tlds.into_iter().map(|t| t.as_ref().to_lowercase()).collect();

        debug!(
            "Typo detector initialized with {} providers and {} TLDs",
            providers.len(),
            valid_tlds.len()
        );

        Self {
            providers,
            valid_tlds,
        }
    }

    /// Suggest the provider domain `domain` was probably meant to be
    ///
    /// A name is a typo when it sits at distance 1 from a provider of up to
    /// six characters, or at distance 1 or 2 from a longer one. The closest
    /// provider wins.
    pub fn check_typo(&self, domain: &str) -> Option<String> {
        let domain_lower = domain.to_lowercase();
        let (sld, tld) = domain_lower.split_once('.')?;

        if !self.valid_tlds.contains(tld) {
            return None;
        }
        if self.providers.iter().any(|p| p == sld) {
            return None;
        }

        let (provider, distance) = self
            .providers
            .iter()
            .map(|provider| (provider, levenshtein(sld, provider)))
            .filter(|(provider, distance)| is_typo_distance(provider, *distance))
            .min_by_key(|(_, distance)| *distance)?;

        let suggestion = format!("{}.{}", provider, tld);
        debug!(
            "Potential typo detected: {} -> {} (distance: {})",
            domain, suggestion, distance
        );
        Some(suggestion)
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

impl Default for TypoDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn is_typo_distance(provider: &str, distance: usize) -> bool {
    if provider.len() <= 6 {
        distance == 1
    } else {
        distance == 1 || distance == 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_obvious_typos() {
        let detector = TypoDetector::new();

        assert_eq!(detector.check_typo("gmai.com"), Some("gmail.com".to_string()));
        assert_eq!(detector.check_typo("gmial.com"), None);
        assert_eq!(detector.check_typo("gnail.com"), Some("gmail.com".to_string()));
        assert_eq!(detector.check_typo("outlok.com"), Some("outlook.com".to_string()));
        assert_eq!(detector.check_typo("hotmial.com"), Some("hotmail.com".to_string()));
        assert_eq!(detector.check_typo("yaho.fr"), Some("yahoo.fr".to_string()));
        assert_eq!(detector.check_typo("hotmal.co.uk"), Some("hotmail.co.uk".to_string()));
    }

    #[test]
    fn test_no_false_positives() {
        let detector = TypoDetector::new();

        assert_eq!(detector.check_typo("gmail.com"), None);
        assert_eq!(detector.check_typo("google.com"), None);
        assert_eq!(detector.check_typo("example.com"), None);
        assert_eq!(detector.check_typo("github.com"), None);
        assert_eq!(detector.check_typo("completely-different.com"), None);
    }

    #[test]
    fn test_unknown_tld_or_no_dot() {
        let detector = TypoDetector::new();

        assert_eq!(detector.check_typo("gmai.invalidtld"), None);
        assert_eq!(detector.check_typo("gmai"), None);
    }

    #[test]
    fn test_case_insensitive() {
        let detector = TypoDetector::new();
        assert_eq!(detector.check_typo("GMAI.COM"), Some("gmail.com".to_string()));
    }

    #[test]
    fn test_custom_providers() {
        let detector = TypoDetector::with_lists(["mycompany", "ab"], ["com"]);

        assert_eq!(detector.provider_count(), 1);
        assert_eq!(detector.check_typo("mycompany.com"), None);
        assert_eq!(detector.check_typo("mycompan.com"), Some("mycompany.com".to_string()));
        assert_eq!(detector.check_typo("mycompany.net"), None);
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein("gmail", "gmail"), 0);
        assert_eq!(levenshtein("gmail", "gmai"), 1);
        assert_eq!(levenshtein("gmail", "gmial"), 2);
        assert_eq!(levenshtein("outlook", "outlok"), 1);
    }
}
