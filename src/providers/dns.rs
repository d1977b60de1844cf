//! DNS record lookups.

use async_trait::async_trait;
use hickory_resolver::{
    TokioAsyncResolver,
    config::{ResolverConfig, ResolverOpts},
    error::ResolveErrorKind,
    proto::rr::RecordType,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{AnalysisProvider, ProviderError};
use crate::models::analysis::AnalysisKind;

const RECORD_TYPES: [RecordType; 8] = [
    RecordType::A,
    RecordType::AAAA,
    RecordType::MX,
    RecordType::NS,
    RecordType::TXT,
    RecordType::CNAME,
    RecordType::SOA,
    RecordType::CAA,
];

/// Resolver from `/etc/resolv.conf`, falling back to the library defaults.
pub fn system_resolver() -> TokioAsyncResolver {
    TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
        warn!(error = %e, "System resolver configuration unavailable, using defaults");
        TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
    })
}

pub struct DnsProvider {
    resolver: TokioAsyncResolver,
}

impl DnsProvider {
    pub fn new(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }

    /// `Ok(vec![])` when the name exists but has no records of this type.
    async fn lookup(&self, domain: &str, record_type: RecordType) -> Result<Vec<String>, String> {
        match self.resolver.lookup(domain, record_type).await {
            Ok(lookup) => Ok(lookup.iter().map(|rdata| rdata.to_string()).collect()),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(Vec::new()),
                _ => Err(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl AnalysisProvider for DnsProvider {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Dns
    }

    async fn fetch(&self, domain: &str) -> Result<Value, ProviderError> {
        let lookups = futures::future::join_all(
            RECORD_TYPES
                .iter()
                .map(|record_type| self.lookup(domain, *record_type)),
        )
        .await;

        let mut records = Map::new();
        let mut errors = Vec::new();
        for (record_type, result) in RECORD_TYPES.iter().zip(lookups) {
            match result {
                Ok(values) => {
                    records.insert(record_type.to_string(), Value::from(values));
                }
                Err(e) => {
                    debug!(domain, %record_type, error = %e, "DNS lookup failed");
                    records.insert(record_type.to_string(), Value::Array(Vec::new()));
                    errors.push(format!("{record_type}: {e}"));
                }
            }
        }

        if errors.len() == RECORD_TYPES.len() {
            return Err(ProviderError::Resolve(errors.join("; ")));
        }

        Ok(serde_json::json!({
            "domain": domain,
            "records": records,
            "errors": errors,
        }))
    }
}
