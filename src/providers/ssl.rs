//! TLS certificate inspection.
//!
//! native-tls is blocking, so the handshake runs on the blocking pool. The
//! first handshake verifies the chain; if that fails a second, unverified
//! handshake fetches the certificate anyway so the caller still sees what
//! the server presents.

use std::{
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use serde_json::Value;
use tokio::task::spawn_blocking;
use tracing::debug;
use x509_parser::prelude::*;

use super::{AnalysisProvider, ProviderError};
use crate::models::analysis::AnalysisKind;

const TLS_PORT: u16 = 443;
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SslProvider;

#[async_trait]
impl AnalysisProvider for SslProvider {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Ssl
    }

    async fn fetch(&self, domain: &str) -> Result<Value, ProviderError> {
        let target = domain.to_string();
        spawn_blocking(move || inspect(&target))
            .await
            .map_err(|e| ProviderError::Unavailable(format!("TLS task failed: {e}")))?
    }
}

fn inspect(domain: &str) -> Result<Value, ProviderError> {
    let (der, chain_trusted, verify_error) = match peer_certificate(domain, true) {
        Ok(der) => (der, true, None),
        Err(verified_err) => {
            debug!(domain, error = %verified_err, "Verified handshake failed, retrying unverified");
            let der = peer_certificate(domain, false)?;
            (der, false, Some(verified_err.to_string()))
        }
    };

    let (_, cert) = parse_x509_certificate(&der)
        .map_err(|e| ProviderError::Protocol(format!("X.509 parse error: {e}")))?;

    let now = Utc::now();
    let validity = cert.validity();
    let not_before = to_utc(&validity.not_before);
    let not_after = to_utc(&validity.not_after);
    let within_dates = now >= not_before && now <= not_after;

    let san = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(serde_json::json!({
        "domain": domain,
        "subject": cert.subject().to_string(),
        "issuer": cert.issuer().to_string(),
        "serial_number": cert.raw_serial_as_string(),
        "valid_from": not_before,
        "valid_to": not_after,
        "days_until_expiry": not_after.signed_duration_since(now).num_days(),
        "is_valid": chain_trusted && within_dates,
        "chain_trusted": chain_trusted,
        "verification_error": verify_error,
        "subject_alt_names": san,
    }))
}

fn peer_certificate(domain: &str, verify: bool) -> Result<Vec<u8>, ProviderError> {
    let connect_err = |reason: String| ProviderError::Connect {
        host: domain.to_string(),
        reason,
    };

    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(!verify)
        .danger_accept_invalid_hostnames(!verify)
        .build()
        .map_err(|e| ProviderError::Unavailable(format!("TLS connector error: {e}")))?;

    let addr = (domain, TLS_PORT)
        .to_socket_addrs()
        .map_err(|e| ProviderError::Resolve(e.to_string()))?
        .next()
        .ok_or_else(|| ProviderError::Resolve(format!("{domain} has no addresses")))?;

    let stream =
        TcpStream::connect_timeout(&addr, SOCKET_TIMEOUT).map_err(|e| connect_err(e.to_string()))?;
    stream
        .set_read_timeout(Some(SOCKET_TIMEOUT))
        .and_then(|_| stream.set_write_timeout(Some(SOCKET_TIMEOUT)))
        .map_err(|e| connect_err(e.to_string()))?;

    let tls = connector
        .connect(domain, stream)
        .map_err(|e| connect_err(format!("TLS handshake failed: {e}")))?;

    let cert = tls
        .peer_certificate()
        .map_err(|e| ProviderError::Protocol(e.to_string()))?
        .ok_or_else(|| ProviderError::Protocol("server presented no certificate".into()))?;

    cert.to_der()
        .map_err(|e| ProviderError::Protocol(format!("certificate encoding error: {e}")))
}

fn to_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}
