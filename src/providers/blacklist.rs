//! DNS blacklist (DNSBL) checks.
//!
//! Each IPv4 address of the domain is reversed and looked up under every
//! configured zone. An A answer means the address is listed; NXDOMAIN means
//! it is clean.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use hickory_resolver::{TokioAsyncResolver, error::ResolveErrorKind};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{AnalysisProvider, ProviderError};
use crate::models::analysis::AnalysisKind;

pub struct BlacklistProvider {
    resolver: TokioAsyncResolver,
    zones: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ZoneCheck {
    ip: String,
    zone: String,
    listed: bool,
    /// Return codes (127.0.0.x) given by the zone when listed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl BlacklistProvider {
    pub fn new(resolver: TokioAsyncResolver, zones: Vec<String>) -> Self {
        Self { resolver, zones }
    }

    async fn check(&self, ip: Ipv4Addr, zone: &str) -> ZoneCheck {
        let query = format!("{}.{zone}.", reversed(ip));

        let (listed, codes, error) = match self.resolver.ipv4_lookup(query.as_str()).await {
            Ok(answer) => (true, answer.iter().map(|a| a.to_string()).collect(), None),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => (false, Vec::new(), None),
                _ => {
                    debug!(%ip, zone, error = %e, "DNSBL query failed");
                    (false, Vec::new(), Some(e.to_string()))
                }
            },
        };

        ZoneCheck {
            ip: ip.to_string(),
            zone: zone.to_string(),
            listed,
            codes,
            error,
        }
    }
}

/// `1.2.3.4` → `4.3.2.1`
fn reversed(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{d}.{c}.{b}.{a}")
}

#[async_trait]
impl AnalysisProvider for BlacklistProvider {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Blacklist
    }

    async fn fetch(&self, domain: &str) -> Result<Value, ProviderError> {
        let addresses: Vec<Ipv4Addr> = self
            .resolver
            .ipv4_lookup(domain)
            .await
            .map_err(|e| ProviderError::Resolve(e.to_string()))?
            .iter()
            .map(|a| a.0)
            .collect();

        let checks = futures::future::join_all(
            addresses
                .iter()
                .flat_map(|ip| self.zones.iter().map(move |zone| (*ip, zone.as_str())))
                .map(|(ip, zone)| self.check(ip, zone)),
        )
        .await;

        let listings: Vec<&ZoneCheck> = checks.iter().filter(|c| c.listed).collect();

        Ok(serde_json::json!({
            "domain": domain,
            "ip_addresses": addresses.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "zones_checked": self.zones,
            "is_blacklisted": !listings.is_empty(),
            "listed_count": listings.len(),
            "listings": listings,
            "checks": checks,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octets_are_reversed_for_dnsbl_queries() {
        assert_eq!(reversed(Ipv4Addr::new(192, 0, 2, 99)), "99.2.0.192");
    }
}
