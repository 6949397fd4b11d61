//! Disposable domain detection using a Bloom filter
//!
//! A built-in list of throwaway-mail services is always loaded. Operators can
//! extend it with a plain-text list file, one domain per line.

use crate::syntax::is_valid_domain_format;
use anyhow::{Context, Result};
use fastbloom::BloomFilter;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Throwaway-mail services known without any list file
const BUILTIN_DISPOSABLE: &[&str] = &[
    "10minutemail.com", "10minutemail.net", "20minutemail.com", "33mail.com",
    "anonbox.net", "burnermail.io", "discard.email", "dispostable.com",
    "dropmail.me", "emailondeck.com", "fakeinbox.com", "getairmail.com",
    "getnada.com", "guerrillamail.biz", "guerrillamail.com", "guerrillamail.de",
    "guerrillamail.info", "guerrillamail.net", "guerrillamail.org",
    "guerrillamailblock.com", "harakirimail.com", "incognitomail.org",
    "mailcatch.com", "maildrop.cc", "mailinator.com", "mailinator.net",
    "mailnesia.com", "mailsac.com", "mintemail.com", "mohmal.com",
    "moakt.com", "mytemp.email", "nada.email", "sharklasers.com",
    "spam4.me", "spambox.us", "spamgourmet.com", "temp-mail.io",
    "temp-mail.org", "tempail.com", "tempmail.com", "tempmail.net",
    "tempmailo.com", "tempr.email", "throwawaymail.com", "trashmail.com",
    "trashmail.de", "trashmail.net", "yopmail.com", "yopmail.fr",
    "yopmail.net",
];

/// Bloom-filter backed membership test for disposable domains
pub struct DisposableDetector {
    bloom_filter: BloomFilter,
    domain_count: usize,
}

impl DisposableDetector {
    /// Build a detector over `domains`
    ///
    /// Domains are lowercased before insertion. An empty list is rejected.
    pub fn new<I, S>(domains: I, false_positive_rate: f64) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            anyhow::bail!(
                "Bloom filter false positive rate must be between 0 and 1, got {}",
                false_positive_rate
            );
        }

        let domains: HashSet<String> = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        if domains.is_empty() {
            anyhow::bail!("No domains provided for disposable detection");
        }

        let domain_count = domains.len();
        let bloom_filter = BloomFilter::with_false_pos(false_positive_rate).items(domains.iter());

        info!(
            "Disposable detector initialized with {} domains, {:.4}% false positive rate",
            domain_count,
            false_positive_rate * 100.0
        );

        Ok(Self {
            bloom_filter,
            domain_count,
        })
    }

    /// Detector over the built-in list only
    pub fn builtin(false_positive_rate: f64) -> Result<Self> {
        Self::new(BUILTIN_DISPOSABLE.iter(), false_positive_rate)
    }

    /// Detector over the built-in list plus the domains in `path`
    pub fn with_list_file(path: impl AsRef<Path>, false_positive_rate: f64) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read disposable list {}", path.display()))?;
        let extra = parse_disposable_list(&content);
        debug!("Loaded {} disposable domains from {}", extra.len(), path.display());

        Self::new(
            BUILTIN_DISPOSABLE.iter().map(|d| d.to_string()).chain(extra),
            false_positive_rate,
        )
    }

    /// May report false positives at the configured rate, never false negatives
    pub fn is_disposable(&self, domain: &str) -> bool {
        let normalized_domain = domain.to_lowercase();
        let result = self.bloom_filter.contains(&normalized_domain);

        if result {
            debug!("Domain '{}' flagged as disposable", domain);
        }

        result
    }

    pub fn domain_count(&self) -> usize {
        self.domain_count
    }
}

/// Parse a list file, skipping blank lines, `#` comments and malformed entries
fn parse_disposable_list(content: &str) -> Vec<String> {
    let mut domains = Vec::new();
    let mut invalid_count = 0;

    for (line_no, line) in content.lines().enumerate() {
        let domain = line.trim();
        if domain.is_empty() || domain.starts_with('#') {
            continue;
        }

        let domain = domain.to_lowercase();
        if is_valid_domain_format(&domain) {
            domains.push(domain);
        } else {
            invalid_count += 1;
            if invalid_count <= 10 {
                warn!("Invalid domain format at line {}: '{}'", line_no + 1, domain);
            }
        }
    }

    if invalid_count > 10 {
        warn!("... and {} more invalid domain entries", invalid_count - 10);
    }

    domains
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_builtin_detection() {
        let detector = DisposableDetector::builtin(0.0001).unwrap();

        assert!(detector.is_disposable("mailinator.com"));
        assert!(detector.is_disposable("10minutemail.com"));
        assert!(detector.is_disposable("YOPMAIL.COM"));
        assert!(!detector.is_disposable("gmail.com"));
        assert!(!detector.is_disposable("example.com"));
        assert_eq!(detector.domain_count(), BUILTIN_DISPOSABLE.len());
    }

    #[test]
    fn test_rejects_empty_list_and_bad_rate() {
        assert!(DisposableDetector::new(Vec::<String>::new(), 0.01).is_err());
        assert!(DisposableDetector::new(["a.com"], 0.0).is_err());
        assert!(DisposableDetector::new(["a.com"], 1.5).is_err());
    }

    #[test]
    fn test_duplicates_counted_once() {
        let detector = DisposableDetector::new(["TempMail.Org", "tempmail.org"], 0.01).unwrap();
        assert_eq!(detector.domain_count(), 1);
        assert!(detector.is_disposable("tempmail.org"));
    }

    #[test]
    fn test_parse_disposable_list() {
        let content = r#"
# This is a comment
throwaway.example

Burner.Example
invalid_domain_without_dot
"#;

        let domains = parse_disposable_list(content);
        assert_eq!(domains, vec!["throwaway.example".to_string(), "burner.example".to_string()]);
    }

    #[test]
    fn test_list_file_extends_builtin() {
        let path = std::env::temp_dir().join(format!("mailscope-disposable-{}.txt", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# extra").unwrap();
        writeln!(file, "throwaway.example").unwrap();
        drop(file);

        let detector = DisposableDetector::with_list_file(&path, 0.0001).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(detector.is_disposable("throwaway.example"));
        assert!(detector.is_disposable("mailinator.com"));
        assert_eq!(detector.domain_count(), BUILTIN_DISPOSABLE.len() + 1);
    }

    #[test]
    fn test_missing_list_file() {
        let result = DisposableDetector::with_list_file("/nonexistent/mailscope/list.txt", 0.01);
        assert!(result.is_err());
    }
}
