//! API key digests, verification and issuance.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::api_key::{ApiKey, IssuedApiKey, KeyStatus, NewApiKey, User};
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every issued key, so leaked keys are recognizable in scans.
pub const KEY_PREFIX: &str = "dk_";

/// Deterministic, peppered digest of an API key.
///
/// HMAC-SHA256 keyed by the server pepper, hex-encoded. Lookups go by this
/// digest; the plaintext key is never stored or compared.
pub fn hash_api_key(pepper: &str, api_key: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(pepper.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(api_key.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// 32 random bytes, hex-encoded, behind [`KEY_PREFIX`].
pub fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("{KEY_PREFIX}{}", hex::encode(bytes))
}

/// Resolve a presented key to its record and owner.
///
/// # Errors
///
/// - `InvalidApiKey`: unknown digest or status other than active
/// - `ExpiredApiKey`: `expires_at` is at or before `now`
/// - `AccountInactive`: the owning user is suspended or disabled
pub async fn authenticate(
    state: &AppState,
    presented: &str,
    now: DateTime<Utc>,
) -> Result<(ApiKey, User), AppError> {
    let key_hash = hash_api_key(&state.config.api_key_pepper, presented);

    let (key, user) = state
        .stores
        .credentials
        .find_key_by_hash(&key_hash)
        .await?
        .ok_or(AppError::InvalidApiKey)?;

    if key.status != KeyStatus::Active {
        tracing::debug!(key_id = %key.id, status = key.status.as_str(), "Rejected inactive key");
        return Err(AppError::InvalidApiKey);
    }

    if key.is_expired_at(now) {
        tracing::debug!(key_id = %key.id, "Rejected expired key");
        return Err(AppError::ExpiredApiKey);
    }

    if !user.is_active() {
        tracing::debug!(user_id = %user.id, status = user.status.as_str(), "Rejected key of inactive user");
        return Err(AppError::AccountInactive);
    }

    Ok((key, user))
}

/// Record key use without holding up the request.
pub fn touch_last_used(state: &AppState, key_id: Uuid, at: DateTime<Utc>) {
    let credentials = state.stores.credentials.clone();
    tokio::spawn(async move {
        if let Err(e) = credentials.touch_last_used(key_id, at).await {
            tracing::warn!(%key_id, error = %e, "Failed to update key last_used_at");
        }
    });
}

/// Create a key for an existing user.
///
/// The returned `secret` is the only copy of the plaintext key.
pub async fn issue_api_key(state: &AppState, request: NewApiKey) -> Result<IssuedApiKey, AppError> {
    let rate_limit_per_hour = request
        .rate_limit_per_hour
        .unwrap_or_else(|| request.plan.default_rate_limit());
    if rate_limit_per_hour < 0 {
        return Err(AppError::invalid("rate_limit_per_hour must not be negative"));
    }

    let secret = generate_api_key();
    let key = ApiKey {
        id: Uuid::new_v4(),
        key_hash: hash_api_key(&state.config.api_key_pepper, &secret),
        user_id: request.user_id,
        name: request.name,
        plan: request.plan,
        status: KeyStatus::Active,
        rate_limit_per_hour,
        expires_at: request.expires_at,
        last_used_at: None,
        created_at: state.now(),
    };

    state.stores.credentials.insert_api_key(&key).await?;
    tracing::info!(key_id = %key.id, user_id = %key.user_id, "API key issued");

    Ok(IssuedApiKey { key, secret })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic_and_peppered() {
        let a = hash_api_key("pepper", "dk_secret");
        let b = hash_api_key("pepper", "dk_secret");
        let c = hash_api_key("other", "dk_secret");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(!a.contains("secret"));
    }

    #[test]
    fn generated_keys_carry_prefix() {
        let key = generate_api_key();
        assert!(key.starts_with(KEY_PREFIX));
        assert_eq!(key.len(), KEY_PREFIX.len() + 64);
        assert_ne!(key, generate_api_key());
    }
}
