//! API key authentication middleware.
//!
//! This middleware intercepts every gateway request to:
//! 1. Extract the API key from the `X-API-Key` header (or, on the advanced
//!    gateway, the `api_key` query parameter)
//! 2. Digest it and resolve the key and its owner
//! 3. Inject a [`RequestContext`] into the request
//! 4. Reject unauthenticated requests with 401, inactive accounts with 403

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Uri, header},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::api_key::{ApiKey, User};
use crate::services::auth_service;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_QUERY_PARAM: &str = "api_key";
pub const ADVANCED_PREFIX: &str = "/api/v2/advanced";

/// Who is calling, resolved once per request.
///
/// Inserted into the request's extension map by [`auth_middleware`] and
/// extracted by later middleware and handlers with `Extension<RequestContext>`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub api_key: ApiKey,
    pub user: User,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }
}

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Read `X-API-Key`; on `/api/v2/advanced/*` fall back to `?api_key=`
///    when `ADVANCED_ALLOW_QUERY_KEY` is set
/// 2. Verify the key (status, expiry, owner status)
/// 3. Touch `last_used_at` in the background
/// 4. Inject `RequestContext`, call the next handler
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = match header_key(request.headers()) {
        Some(key) => key,
        None if allows_query_key(&state, request.uri()) => {
            let key = query_key(request.uri()).ok_or(AppError::MissingApiKey)?;
            tracing::debug!(path = request.uri().path(), "API key taken from query string");
            key
        }
        None => return Err(AppError::MissingApiKey),
    };

    let now = state.now();
    let (api_key, user) = auth_service::authenticate(&state, &presented, now).await?;
    auth_service::touch_last_used(&state, api_key.id, now);

    let context = RequestContext {
        api_key,
        user,
        ip_address: client_ip(&request),
        user_agent: request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(String::from),
    };

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

fn header_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
}

fn allows_query_key(state: &AppState, uri: &Uri) -> bool {
    state.config.advanced_allow_query_key && is_advanced_path(uri.path())
}

pub fn is_advanced_path(path: &str) -> bool {
    path == ADVANCED_PREFIX || path.starts_with(&format!("{ADVANCED_PREFIX}/"))
}

fn query_key(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == API_KEY_QUERY_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|k| !k.is_empty())
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
fn client_ip(request: &Request) -> Option<String> {
    let headers = request.headers();
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|h| h.to_str().ok()))
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advanced_prefix_matches_whole_segments() {
        assert!(is_advanced_path("/api/v2/advanced"));
        assert!(is_advanced_path("/api/v2/advanced/bulk"));
        assert!(!is_advanced_path("/api/v2/advancedx"));
        assert!(!is_advanced_path("/api/v2/dns"));
    }

    #[test]
    fn query_key_is_decoded() {
        let uri: Uri = "/api/v2/advanced/bulk?x=1&api_key=dk_abc%2B1".parse().unwrap();
        assert_eq!(query_key(&uri).as_deref(), Some("dk_abc+1"));

        let uri: Uri = "/api/v2/advanced/bulk?api_key=".parse().unwrap();
        assert_eq!(query_key(&uri), None);
    }
}
