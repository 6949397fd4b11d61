//! Structural address validation
//!
//! Runs synchronously before any network work. An address that fails here is
//! never sent to DNS or SMTP.

use crate::types::ValidationResult;
use email_address::EmailAddress;
use std::str::FromStr;
use tracing::debug;

pub const SYNTAX_WEIGHT: u32 = 20;

const MAX_LOCAL_PART_LEN: usize = 64;
const MAX_DOMAIN_LEN: usize = 253;
const MAX_ADDRESS_LEN: usize = 254;

/// Syntax verdict plus the parts of the address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxCheck {
    pub result: ValidationResult,
    pub local_part: String,
    pub domain: String,
}

impl SyntaxCheck {
    pub fn is_valid(&self) -> bool {
        self.result.passed()
    }
}

/// Validate an already normalized (trimmed, lowercased) address
pub fn check_syntax(email: &str) -> SyntaxCheck {
    let (local_part, domain) = match email.rsplit_once('@') {
        Some((local, domain)) => (local.to_string(), domain.to_string()),
        None => (String::new(), String::new()),
    };

    let result = match find_violation(email, &local_part, &domain) {
        Some(violation) => {
            debug!("Address failed syntax validation: {}", violation);
            ValidationResult::fail(SYNTAX_WEIGHT, violation, "syntax_invalid")
        }
        None => ValidationResult::pass(SYNTAX_WEIGHT, "Address is well formed", "syntax_valid"),
    };

    SyntaxCheck {
        result,
        local_part,
        domain,
    }
}

fn find_violation(email: &str, local_part: &str, domain: &str) -> Option<String> {
    if email.is_empty() {
        return Some("Address is empty".to_string());
    }
    if email.len() > MAX_ADDRESS_LEN {
        return Some(format!("Address exceeds {} characters", MAX_ADDRESS_LEN));
    }
    if !email.contains('@') {
        return Some("Address has no @ separator".to_string());
    }
    if local_part.is_empty() {
        return Some("Local part is empty".to_string());
    }
    if local_part.len() > MAX_LOCAL_PART_LEN {
        return Some(format!("Local part exceeds {} characters", MAX_LOCAL_PART_LEN));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Some(format!("Domain exceeds {} characters", MAX_DOMAIN_LEN));
    }
    if local_part.starts_with('.') || local_part.ends_with('.') || local_part.contains("..") {
        return Some("Local part has a leading, trailing or doubled dot".to_string());
    }
    if !local_part.chars().all(is_local_part_char) {
        return Some("Local part contains unsupported characters".to_string());
    }
    if !is_valid_domain_format(domain) {
        return Some(format!("Domain '{}' is not a valid host name", domain));
    }
    if EmailAddress::from_str(email).is_err() {
        return Some("Address is not RFC 5322 compliant".to_string());
    }
    None
}

fn is_local_part_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "._%+-'!#$&*/=?^`{|}~".contains(c)
}

/// Host-name rules for the domain part
///
/// At least two labels, labels of 1-63 alphanumerics or inner hyphens, and an
/// alphabetic top-level label of two or more characters.
pub(crate) fn is_valid_domain_format(domain: &str) -> bool {
    if domain.len() > MAX_DOMAIN_LEN || domain.is_empty() {
        return false;
    }

    if !domain.contains('.') {
        return false;
    }

    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return false;
    }

    for label in domain.split('.') {
        if label.is_empty() || label.len() > 63 {
            return false;
        }

        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return false;
        }
    }

    domain
        .rsplit('.')
        .next()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
}
