//! API key and user models.
//!
//! API keys authenticate callers. Only a peppered SHA-256 digest of each key
//! is stored; the secret itself is shown once when the key is issued.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an API key. Keys are never deleted, only moved out of `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Revoked,
    Expired,
}

impl KeyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Revoked => "revoked",
            KeyStatus::Expired => "expired",
        }
    }
}

impl FromStr for KeyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(KeyStatus::Active),
            "revoked" => Ok(KeyStatus::Revoked),
            "expired" => Ok(KeyStatus::Expired),
            other => Err(format!("unknown key status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
    Disabled,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Disabled => "disabled",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            "disabled" => Ok(UserStatus::Disabled),
            other => Err(format!("unknown user status: {other}")),
        }
    }
}

/// Subscription tier. Each tier has a default hourly ceiling used when a key
/// is issued without an explicit one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }

    pub fn default_rate_limit(self) -> i32 {
        match self {
            PlanTier::Free => 100,
            PlanTier::Basic => 1_000,
            PlanTier::Pro => 5_000,
            PlanTier::Enterprise => 20_000,
        }
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanTier::Free),
            "basic" => Ok(PlanTier::Basic),
            "pro" => Ok(PlanTier::Pro),
            "enterprise" => Ok(PlanTier::Enterprise),
            other => Err(format!("unknown plan: {other}")),
        }
    }
}

/// An API key record.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: Uuid,

    /// Hex HMAC-SHA256 of the secret under the server pepper (64 hex characters)
    pub key_hash: String,

    pub user_id: Uuid,

    pub name: String,

    pub plan: PlanTier,

    pub status: KeyStatus,

    /// Hourly request ceiling enforced by the rate limiter
    pub rate_limit_per_hour: i32,

    pub expires_at: Option<DateTime<Utc>>,

    pub last_used_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub plan: PlanTier,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Parameters for issuing a key.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub user_id: Uuid,
    pub name: String,
    pub plan: PlanTier,
    pub rate_limit_per_hour: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A freshly issued key. `secret` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub key: ApiKey,
    pub secret: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_is_inclusive_of_the_expiry_instant() {
        let now = Utc::now();
        let key = ApiKey {
            id: Uuid::new_v4(),
            key_hash: String::new(),
            user_id: Uuid::new_v4(),
            name: "test".into(),
            plan: PlanTier::Free,
            status: KeyStatus::Active,
            rate_limit_per_hour: 10,
            expires_at: Some(now),
            last_used_at: None,
            created_at: now - Duration::days(1),
        };

        assert!(key.is_expired_at(now));
        assert!(!key.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn statuses_round_trip_through_text() {
        for status in [KeyStatus::Active, KeyStatus::Revoked, KeyStatus::Expired] {
            assert_eq!(status.as_str().parse::<KeyStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<UserStatus>().is_err());
    }
}
