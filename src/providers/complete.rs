//! Complete scan: every single-lookup provider at once.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{AnalysisProvider, ProviderError};
use crate::models::analysis::AnalysisKind;

pub struct CompleteScanProvider {
    sections: Vec<Arc<dyn AnalysisProvider>>,
}

impl CompleteScanProvider {
    pub fn new(sections: Vec<Arc<dyn AnalysisProvider>>) -> Self {
        Self { sections }
    }
}

#[async_trait]
impl AnalysisProvider for CompleteScanProvider {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Complete
    }

    /// Each section holds its provider's payload or `{ "error": ... }`.
    /// The scan itself only fails when no section succeeded.
    async fn fetch(&self, domain: &str) -> Result<Value, ProviderError> {
        let results =
            futures::future::join_all(self.sections.iter().map(|p| p.fetch(domain))).await;

        let mut scan = Map::new();
        scan.insert("domain".into(), Value::from(domain));

        let mut errors = Vec::new();
        for (provider, result) in self.sections.iter().zip(results) {
            let section = match result {
                Ok(payload) => payload,
                Err(e) => {
                    errors.push(format!("{}: {e}", provider.kind()));
                    serde_json::json!({ "error": e.to_string() })
                }
            };
            scan.insert(provider.kind().to_string(), section);
        }

        if !self.sections.is_empty() && errors.len() == self.sections.len() {
            return Err(ProviderError::Unavailable(format!(
                "every lookup failed ({})",
                errors.join("; ")
            )));
        }

        Ok(Value::Object(scan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(AnalysisKind, Result<Value, String>);

    #[async_trait]
    impl AnalysisProvider for Fixed {
        fn kind(&self) -> AnalysisKind {
            self.0
        }

        async fn fetch(&self, _domain: &str) -> Result<Value, ProviderError> {
            self.1.clone().map_err(ProviderError::Unavailable)
        }
    }

    #[tokio::test]
    async fn failing_sections_are_inlined() {
        let provider = CompleteScanProvider::new(vec![
            Arc::new(Fixed(AnalysisKind::Dns, Ok(serde_json::json!({ "a": 1 })))),
            Arc::new(Fixed(AnalysisKind::Ssl, Err("refused".into()))),
        ]);

        let scan = provider.fetch("example.com").await.unwrap();

        assert_eq!(scan["dns"]["a"], 1);
        assert_eq!(scan["ssl"]["error"], "refused");
    }

    #[tokio::test]
    async fn scan_fails_when_every_section_fails() {
        let provider = CompleteScanProvider::new(vec![
            Arc::new(Fixed(AnalysisKind::Dns, Err("servfail".into()))),
            Arc::new(Fixed(AnalysisKind::Whois, Err("reset".into()))),
        ]);

        assert!(provider.fetch("example.com").await.is_err());
    }
}
