//! Identity resolution for bearer credentials
//!
//! The hub only needs to know who a caller is; where that answer comes from is
//! pluggable behind [`IdentityProvider`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::token::TokenManager;
use crate::error::{HubError, Result};

/// A resolved caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
}

/// Resolves a bearer credential to an identity or fails
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Identity>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

pub type SharedIdentityProvider = Arc<dyn IdentityProvider>;

/// Validates HS256 JWTs signed with a shared secret
pub struct JwtIdentityProvider {
    tokens: TokenManager,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Self {
        Self {
            tokens: TokenManager::new(secret),
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve(&self, credential: &str) -> Result<Identity> {
        let claims = self.tokens.validate_token(credential).map_err(|e| {
            log::debug!("JWT validation failed: {}", e);
            HubError::Unauthorized
        })?;

        Ok(Identity {
            user_id: claims.sub,
            email: claims.email,
        })
    }

    fn provider_name(&self) -> &'static str {
        "JWT"
    }
}
