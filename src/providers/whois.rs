//! WHOIS over TCP port 43.
//!
//! The IANA server is asked first. Its answer names the registry server for
//! the TLD in a `refer:` line, which is then asked for the domain itself.

use async_trait::async_trait;
use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::debug;

use super::{AnalysisProvider, ProviderError};
use crate::models::analysis::AnalysisKind;

const IANA_SERVER: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
/// Registry answers are a few KiB; anything bigger is cut off.
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

pub struct WhoisProvider {
    root_server: String,
}

impl Default for WhoisProvider {
    fn default() -> Self {
        Self {
            root_server: IANA_SERVER.to_string(),
        }
    }
}

impl WhoisProvider {
    async fn query(&self, server: &str, domain: &str) -> Result<String, ProviderError> {
        let connect_err = |e: std::io::Error| ProviderError::Connect {
            host: server.to_string(),
            reason: e.to_string(),
        };

        let mut stream = TcpStream::connect((server, WHOIS_PORT))
            .await
            .map_err(connect_err)?;
        stream
            .write_all(format!("{domain}\r\n").as_bytes())
            .await
            .map_err(connect_err)?;

        let mut buf = Vec::new();
        stream
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut buf)
            .await
            .map_err(connect_err)?;

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[async_trait]
impl AnalysisProvider for WhoisProvider {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Whois
    }

    async fn fetch(&self, domain: &str) -> Result<Value, ProviderError> {
        let root_answer = self.query(&self.root_server, domain).await?;

        let (server, raw) = match referral(&root_answer) {
            Some(server) if server != self.root_server => {
                debug!(domain, server, "Following WHOIS referral");
                let raw = self.query(&server, domain).await?;
                (server, raw)
            }
            _ => (self.root_server.clone(), root_answer),
        };

        if raw.trim().is_empty() {
            return Err(ProviderError::Protocol(format!(
                "{server} returned an empty WHOIS response"
            )));
        }

        let record = WhoisRecord::parse(&raw);
        Ok(serde_json::json!({
            "domain": domain,
            "whois_server": server,
            "registrar": record.registrar,
            "creation_date": record.creation_date,
            "updated_date": record.updated_date,
            "expiration_date": record.expiration_date,
            "name_servers": record.name_servers,
            "status": record.statuses,
            "raw": raw,
        }))
    }
}

fn referral(answer: &str) -> Option<String> {
    answer.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim().to_ascii_lowercase();
        (key == "refer" || key == "whois")
            .then(|| value.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
    })
}

#[derive(Debug, Default, PartialEq)]
struct WhoisRecord {
    registrar: Option<String>,
    creation_date: Option<String>,
    updated_date: Option<String>,
    expiration_date: Option<String>,
    name_servers: Vec<String>,
    statuses: Vec<String>,
}

impl WhoisRecord {
    /// Registries disagree on labels, so each field accepts the common spellings.
    fn parse(raw: &str) -> Self {
        let mut record = Self::default();

        for line in raw.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match key.as_str() {
                "registrar" | "sponsoring registrar" => {
                    record.registrar.get_or_insert_with(|| value.to_string());
                }
                "creation date" | "created" | "registered on" | "registration time" => {
                    record.creation_date.get_or_insert_with(|| value.to_string());
                }
                "updated date" | "last updated" | "changed" | "last-update" => {
                    record.updated_date.get_or_insert_with(|| value.to_string());
                }
                "registry expiry date"
                | "registrar registration expiration date"
                | "expiry date"
                | "expiration date"
                | "paid-till"
                | "expires" => {
                    record
                        .expiration_date
                        .get_or_insert_with(|| value.to_string());
                }
                "name server" | "nserver" | "nameserver" => {
                    let ns = value
                        .split_whitespace()
                        .next()
                        .unwrap_or(value)
                        .trim_end_matches('.')
                        .to_ascii_lowercase();
                    if !record.name_servers.contains(&ns) {
                        record.name_servers.push(ns);
                    }
                }
                "domain status" | "status" => {
                    // "clientTransferProhibited https://icann.org/epp#..." keeps only the code
                    let status = value.split_whitespace().next().unwrap_or(value).to_string();
                    if !record.statuses.contains(&status) {
                        record.statuses.push(status);
                    }
                }
                _ => {}
            }
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IANA_ANSWER: &str = "% IANA WHOIS server\n\
        domain:       COM\n\
        organisation: VeriSign Global Registry Services\n\
        refer:        whois.verisign-grs.com\n\
        status:       ACTIVE\n";

    const REGISTRY_ANSWER: &str = "   Domain Name: EXAMPLE.COM\n\
        Registrar: RESERVED-Internet Assigned Numbers Authority\n\
        Updated Date: 2024-08-14T07:01:34Z\n\
        Creation Date: 1995-08-14T04:00:00Z\n\
        Registry Expiry Date: 2025-08-13T04:00:00Z\n\
        Domain Status: clientDeleteProhibited https://icann.org/epp#clientDeleteProhibited\n\
        Domain Status: clientTransferProhibited https://icann.org/epp#clientTransferProhibited\n\
        Name Server: A.IANA-SERVERS.NET\n\
        Name Server: B.IANA-SERVERS.NET\n";

    #[test]
    fn referral_is_read_from_iana_answer() {
        assert_eq!(
            referral(IANA_ANSWER).as_deref(),
            Some("whois.verisign-grs.com")
        );
        assert_eq!(referral("no referral here"), None);
    }

    #[test]
    fn registry_fields_are_extracted() {
        let record = WhoisRecord::parse(REGISTRY_ANSWER);

        assert_eq!(
            record.registrar.as_deref(),
            Some("RESERVED-Internet Assigned Numbers Authority")
        );
        assert_eq!(record.creation_date.as_deref(), Some("1995-08-14T04:00:00Z"));
        assert_eq!(record.expiration_date.as_deref(), Some("2025-08-13T04:00:00Z"));
        assert_eq!(
            record.name_servers,
            vec!["a.iana-servers.net", "b.iana-servers.net"]
        );
        assert_eq!(
            record.statuses,
            vec!["clientDeleteProhibited", "clientTransferProhibited"]
        );
    }
}
