//! Acting user and screen access.

pub mod rbac;

use serde::{Deserialize, Serialize};

use crate::models::UserId;

pub use rbac::{authorize, Role, Screen};

/// The signed-in user on whose behalf the controller acts. Its id is
/// attached as author to every created transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}
