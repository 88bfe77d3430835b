use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of a social login. `code` is zero on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLogin {
    pub code: i32,
    pub token: String,
}

/// Opaque social / auth provider (e.g. the Facebook SDK wrapper). Only its
/// login result is used, as the access token of the purchase session.
#[async_trait]
pub trait SocialLoginProvider: Send + Sync {
    async fn login(&self) -> SocialLogin;
}
