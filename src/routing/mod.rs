//! # Routing
//!
//! Resolves an authenticated user's routing key to a backend address.

pub mod authorization;

use async_trait::async_trait;

use crate::domain::{ConnectId, RouteTarget, UserIdentity};
use crate::errors::RouteError;

pub use authorization::AuthorizationStore;

/// Turns `(identity, routing key)` into a backend address or a typed denial.
#[async_trait]
pub trait Router: Send + Sync {
    async fn resolve(
        &self,
        identity: &UserIdentity,
        connect_id: &ConnectId,
    ) -> Result<RouteTarget, RouteError>;
}

#[async_trait]
impl Router for AuthorizationStore {
    async fn resolve(
        &self,
        identity: &UserIdentity,
        connect_id: &ConnectId,
    ) -> Result<RouteTarget, RouteError> {
        self.route(&identity.user_id, &identity.org_id, connect_id).await
    }
}
