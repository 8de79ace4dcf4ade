use catalog::types::UserId;

use crate::error::SchedulingError;

/// Opaque credential presented by a caller. The core never inspects it; the
/// identity provider turns it into a user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Consumed interface: whoever fronts the core (HTTP middleware, bot
/// framework, ...) supplies the authenticated user behind a token.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a token to a stable user id, or fail with
    /// [`SchedulingError::Unauthenticated`].
    async fn resolve(&self, token: &AccessToken) -> Result<UserId, SchedulingError>;
}
