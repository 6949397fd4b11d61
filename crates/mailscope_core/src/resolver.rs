//! DNS resolution using hickory-resolver
//!
//! Every validator talks to DNS through the [`DnsLookup`] trait. The
//! production implementation, [`HickoryResolver`], wraps a tokio resolver
//! configured with short per-query timeouts and a bounded record cache.

use crate::{types::MxRecord, DnsProvider};
use anyhow::Result;
use async_trait::async_trait;
use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    error::{ResolveError, ResolveErrorKind},
    proto::op::ResponseCode,
    TokioAsyncResolver,
};
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Classified DNS failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("no records found")]
    NoRecords,
    #[error("NXDOMAIN: domain does not exist")]
    NxDomain,
    #[error("DNS query timed out")]
    Timeout,
    #[error("DNS error: {0}")]
    Other(String),
}

impl From<ResolveError> for LookupError {
    fn from(err: ResolveError) -> Self {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { response_code, .. } => {
                if *response_code == ResponseCode::NXDomain {
                    LookupError::NxDomain
                } else {
                    LookupError::NoRecords
                }
            }
            ResolveErrorKind::Timeout => LookupError::Timeout,
            _ => LookupError::Other(err.to_string()),
        }
    }
}

/// Asynchronous DNS queries needed by the validators
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// Addresses (A, then AAAA) of a name
    async fn lookup_ip(&self, name: &str) -> Result<Vec<IpAddr>, LookupError>;

    /// Mail exchangers of a domain, in resolver order
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, LookupError>;

    /// TXT records of a name, each record's character-strings concatenated
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, LookupError>;
}

/// DNS resolver wrapper with optimized configuration
pub struct HickoryResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryResolver {
    /// Create a new DNS resolver
    ///
    /// # Arguments
    /// * `provider` - Upstream DNS service
    /// * `timeout_ms` - DNS query timeout in milliseconds
    /// * `attempts` - Maximum number of retry attempts
    /// * `cache_size` - Number of entries to cache
    /// * `min_ttl_secs` - Minimum TTL for positive cache entries
    pub fn new(
        provider: DnsProvider,
        timeout_ms: u64,
        attempts: usize,
        cache_size: usize,
        min_ttl_secs: u64,
    ) -> Result<Self> {
        if timeout_ms == 0 {
            anyhow::bail!("DNS timeout must be greater than zero");
        }

        let config = match provider {
            DnsProvider::Cloudflare => ResolverConfig::cloudflare(),
            DnsProvider::Google => ResolverConfig::google(),
            DnsProvider::Quad9 => ResolverConfig::quad9(),
        };

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_millis(timeout_ms);
        opts.attempts = attempts;
        opts.cache_size = cache_size;
        opts.positive_min_ttl = Some(Duration::from_secs(min_ttl_secs));
        opts.negative_min_ttl = Some(Duration::from_secs(30));
        opts.positive_max_ttl = Some(Duration::from_secs(3600));

        let resolver = TokioAsyncResolver::tokio(config, opts);

        info!(
            "DNS resolver initialized - provider: {:?}, timeout: {}ms, attempts: {}, cache_size: {}",
            provider, timeout_ms, attempts, cache_size
        );

        Ok(Self { resolver })
    }

    /// Clear the resolver's record cache
    pub fn clear_cache(&self) {
        self.resolver.clear_cache();
        info!("DNS cache cleared");
    }
}

#[async_trait]
impl DnsLookup for HickoryResolver {
    async fn lookup_ip(&self, name: &str) -> Result<Vec<IpAddr>, LookupError> {
        let response = self.resolver.lookup_ip(name).await.map_err(|e| {
            debug!("Address lookup failed for {}: {}", name, e);
            LookupError::from(e)
        })?;
        let addrs: Vec<IpAddr> = response.iter().collect();
        debug!("Found {} address(es) for {}", addrs.len(), name);
        Ok(addrs)
    }

    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, LookupError> {
        let response = self.resolver.mx_lookup(domain).await.map_err(|e| {
            debug!("MX record lookup failed for {}: {}", domain, e);
            LookupError::from(e)
        })?;
        let records: Vec<MxRecord> = response
            .iter()
            .map(|mx| MxRecord::new(mx.preference(), mx.exchange().to_utf8()))
            .collect();
        debug!("Domain {} has {} MX record(s)", domain, records.len());
        Ok(records)
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, LookupError> {
        let response = self.resolver.txt_lookup(name).await.map_err(|e| {
            debug!("TXT record lookup failed for {}: {}", name, e);
            LookupError::from(e)
        })?;
        let records: Vec<String> = response
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|data| String::from_utf8_lossy(data))
                    .collect::<String>()
            })
            .collect();
        debug!("Found {} TXT record(s) for {}", records.len(), name);
        Ok(records)
    }
}
