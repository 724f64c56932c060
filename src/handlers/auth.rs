//! Bearer-token gate for mutating endpoints

use warp::{Filter, Rejection};

use crate::auth::{extract_bearer_token, Identity};
use crate::error::HubError;
use crate::handlers::rejection::ApiError;
use crate::handlers::{with_state, AppState};

/// Resolves the caller's identity when auth is required; passes `None` otherwise.
/// Missing or invalid credentials reject with `Unauthorized`.
pub fn with_identity(
    state: AppState,
) -> impl Filter<Extract = (Option<Identity>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(authorize)
}

async fn authorize(
    header: Option<String>,
    state: AppState,
) -> std::result::Result<Option<Identity>, Rejection> {
    if !state.config.require_auth {
        return Ok(None);
    }

    let provider = match &state.identity {
        Some(provider) => provider,
        None => {
            log::error!("Authentication required but no identity provider configured");
            return Err(ApiError::reject(HubError::Unauthorized));
        }
    };

    let token = match header.as_deref().and_then(extract_bearer_token) {
        Some(token) => token,
        None => {
            log::debug!("Request without bearer token rejected");
            return Err(ApiError::reject(HubError::Unauthorized));
        }
    };

    match provider.resolve(token).await {
        Ok(identity) => {
            log::debug!(
                "Authenticated {} via {}",
                identity.user_id,
                provider.provider_name()
            );
            Ok(Some(identity))
        }
        Err(e) => {
            log::warn!("Rejected credential: {}", e);
            Err(ApiError::reject(HubError::Unauthorized))
        }
    }
}
