//! Saved domains, scoped to the owning user.

use uuid::Uuid;

use crate::domain_name;
use crate::error::AppError;
use crate::models::saved_domain::{SaveDomainRequest, SavedDomain};
use crate::state::AppState;

const MAX_LABEL_LEN: usize = 100;

pub async fn list_domains(state: &AppState, user_id: Uuid) -> Result<Vec<SavedDomain>, AppError> {
    state.stores.domains.list(user_id).await
}

/// # Errors
///
/// - `InvalidRequest` for an invalid domain or an over-long label
/// - `Conflict` if the user already saved the domain
pub async fn save_domain(
    state: &AppState,
    user_id: Uuid,
    request: SaveDomainRequest,
) -> Result<SavedDomain, AppError> {
    let domain = domain_name::normalize(&request.domain)?;

    let label = request
        .label
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());
    if label
        .as_ref()
        .is_some_and(|l| l.chars().count() > MAX_LABEL_LEN)
    {
        return Err(AppError::invalid(format!(
            "Label exceeds {MAX_LABEL_LEN} characters"
        )));
    }

    let saved = state
        .stores
        .domains
        .insert(user_id, &domain, label, state.now())
        .await?;
    tracing::info!(domain_id = %saved.id, %user_id, domain = %saved.domain, "Domain saved");

    Ok(saved)
}

/// Another user's domain is reported exactly like a missing one.
pub async fn delete_domain(state: &AppState, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
    if !state.stores.domains.delete(user_id, id).await? {
        return Err(AppError::not_found("Domain"));
    }
    Ok(())
}
