//! Saved-domain models.
//!
//! A saved domain is a bookmark owned by one user. Queries are always scoped
//! by `user_id`, and a domain owned by someone else is reported as not found.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct SavedDomain {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub domain: String,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request body for saving a domain.
///
/// ```json
/// { "domain": "https://Example.com", "label": "Main site" }
/// ```
#[derive(Debug, Deserialize)]
pub struct SaveDomainRequest {
    pub domain: String,
    #[serde(default)]
    pub label: Option<String>,
}
