//! Shared application state.

use std::sync::Arc;

use crate::{
    clock::{Clock, SystemClock},
    config::Config,
    providers::ProviderRegistry,
    store::Stores,
};

/// Everything a handler, middleware or background task needs.
///
/// Cloning is cheap: every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stores: Stores,
    pub clock: Arc<dyn Clock>,
    pub providers: ProviderRegistry,
    /// Outbound client for webhook deliveries and the screenshot renderer
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, providers: ProviderRegistry) -> Self {
        Self::with_clock(config, stores, providers, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Config,
        stores: Stores,
        providers: ProviderRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.webhook_timeout())
            .user_agent(concat!("domain-diagnostics/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            config: Arc::new(config),
            stores,
            clock,
            providers,
            http,
        }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}
