//! Lookup providers.
//!
//! A provider answers one [`AnalysisKind`] for one already-normalized domain
//! and returns structured JSON. The gateway never looks inside the payload
//! except to add `execution_time_ms` to complete scans.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{config::Config, error::AppError, models::analysis::AnalysisKind};

pub mod blacklist;
pub mod complete;
pub mod dns;
pub mod ssl;
pub mod whois;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("DNS resolution failed: {0}")]
    Resolve(String),

    #[error("Connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("{0}")]
    Unavailable(String),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::UpstreamFailure(err.to_string())
    }
}

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    fn kind(&self) -> AnalysisKind;

    async fn fetch(&self, domain: &str) -> Result<serde_json::Value, ProviderError>;
}

/// Kind → provider table shared by every request.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<AnalysisKind, Arc<dyn AnalysisProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own kind, replacing any previous one.
    pub fn with(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: AnalysisKind) -> Result<Arc<dyn AnalysisProvider>, AppError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("no provider registered for {kind}")))
    }

    /// The network-backed providers used in production.
    pub fn standard(config: &Config) -> Self {
        let resolver = dns::system_resolver();

        let dns: Arc<dyn AnalysisProvider> = Arc::new(dns::DnsProvider::new(resolver.clone()));
        let whois: Arc<dyn AnalysisProvider> = Arc::new(whois::WhoisProvider::default());
        let blacklist: Arc<dyn AnalysisProvider> = Arc::new(blacklist::BlacklistProvider::new(
            resolver,
            config.dnsbl_zones.clone(),
        ));
        let ssl: Arc<dyn AnalysisProvider> = Arc::new(ssl::SslProvider);

        let complete = complete::CompleteScanProvider::new(vec![
            dns.clone(),
            whois.clone(),
            blacklist.clone(),
            ssl.clone(),
        ]);

        Self::new()
            .with(dns)
            .with(whois)
            .with(blacklist)
            .with(ssl)
            .with(Arc::new(complete))
    }
}
