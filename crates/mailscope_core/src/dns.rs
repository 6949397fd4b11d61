//! Domain existence and MX validation

use crate::resolver::{DnsLookup, LookupError};
use crate::types::{DnsValidationResult, MxRecord, ValidationResult};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

pub const MX_WEIGHT: u32 = 20;

/// Resolves A and MX records for a domain
pub struct DnsValidator {
    resolver: Arc<dyn DnsLookup>,
    timeout: Duration,
}

impl DnsValidator {
    pub fn new(resolver: Arc<dyn DnsLookup>, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    /// Run the address and MX lookups in parallel
    #[instrument(skip(self))]
    pub async fn validate(&self, domain: &str) -> DnsValidationResult {
        let started = Instant::now();

        let (ip_result, mx_result) = tokio::join!(
            bounded(self.timeout, self.resolver.lookup_ip(domain)),
            bounded(self.timeout, self.resolver.lookup_mx(domain)),
        );

        let (domain_exists, a_records) = match ip_result {
            Ok(addrs) if !addrs.is_empty() => {
                let a_records: Vec<String> = addrs.iter().map(ToString::to_string).collect();
                let result = ValidationResult::pass(
                    0,
                    format!("Domain resolves to {} address(es)", a_records.len()),
                    a_records.join(","),
                );
                (result, a_records)
            }
            Ok(_) => (
                ValidationResult::fail(0, "Domain has no address records", "no_records"),
                Vec::new(),
            ),
            Err(e) => (
                ValidationResult::fail(0, format!("Address lookup failed: {}", e), signal(&e)),
                Vec::new(),
            ),
        };

        let (mx_records, mx_details) = match mx_result {
            Ok(records) if !records.is_empty() => {
                let mut records = records;
                records.sort();
                records.dedup();
                let summary = records
                    .iter()
                    .map(|mx| format!("{}:{}", mx.priority, mx.host))
                    .collect::<Vec<_>>()
                    .join(",");
                let result = ValidationResult::pass(
                    MX_WEIGHT,
                    format!("Found {} MX record(s)", records.len()),
                    summary,
                );
                (result, records)
            }
            Ok(_) => (
                ValidationResult::fail(MX_WEIGHT, "Domain has no MX records", "no_records"),
                Vec::new(),
            ),
            Err(e) => (
                ValidationResult::fail(MX_WEIGHT, format!("MX lookup failed: {}", e), signal(&e)),
                Vec::new(),
            ),
        };

        debug!(
            "DNS validation for {}: exists={}, mx={}",
            domain,
            domain_exists.passed(),
            mx_details.len()
        );

        DnsValidationResult {
            domain_exists,
            mx_records,
            a_records,
            mx_details,
            response_time_ms: elapsed_ms(started),
        }
    }
}

/// Apply the validator deadline to one lookup
pub(crate) async fn bounded<T>(
    timeout: Duration,
    lookup: impl Future<Output = Result<T, LookupError>>,
) -> Result<T, LookupError> {
    tokio::time::timeout(timeout, lookup)
        .await
        .unwrap_or(Err(LookupError::Timeout))
}

pub(crate) fn signal(error: &LookupError) -> &'static str {
    match error {
        LookupError::NoRecords => "no_records",
        LookupError::NxDomain => "nxdomain",
        LookupError::Timeout => "timeout",
        LookupError::Other(_) => "dns_error",
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
