pub mod identity;
pub mod token;

pub use identity::{Identity, IdentityProvider, JwtIdentityProvider, SharedIdentityProvider};
pub use token::{extract_bearer_token, Claims, TokenManager};
