//! Domain layer
//!
//! Pure data types for identities, backend hosts and routing results, with no
//! database or network dependencies.

pub mod host;
pub mod id;
pub mod identity;

pub use host::{BackendHost, RouteTarget, Team};
pub use id::{ConnectId, OrgId, TeamId, UserId};
pub use identity::UserIdentity;
