/*!
 * Actors and capability checks.
 *
 * Session handling lives outside this crate; callers hand in an already
 * authenticated `Actor` and the services decide what it may do.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{ModerationError, ModerationResult};

/// Platform role of an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Reader,
    Creator,
    Moderator,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Reader => write!(f, "reader"),
            Role::Creator => write!(f, "creator"),
            Role::Moderator => write!(f, "moderator"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reader" => Ok(Role::Reader),
            "creator" => Ok(Role::Creator),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(anyhow::anyhow!("Invalid role: {}", s)),
        }
    }
}

/// The caller of a service operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User identifier, empty for anonymous callers
    pub user_id: String,
    /// Role held by the user
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// An unauthenticated caller
    pub fn anonymous() -> Self {
        Self::new("", Role::Reader)
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_empty()
    }

    /// Moderators and admins may review content
    pub fn can_moderate(&self) -> bool {
        !self.is_anonymous() && matches!(self.role, Role::Moderator | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        !self.is_anonymous() && self.role == Role::Admin
    }

    /// Fail unless the actor holds moderator or admin capability
    pub fn require_moderator(&self) -> ModerationResult<()> {
        if self.can_moderate() {
            Ok(())
        } else {
            Err(ModerationError::Authorization(format!(
                "moderator capability required (actor role: {})",
                self.role
            )))
        }
    }

    /// Fail unless the actor is an admin
    pub fn require_admin(&self) -> ModerationResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ModerationError::Authorization(format!(
                "admin capability required (actor role: {})",
                self.role
            )))
        }
    }

    /// Fail unless the actor is exactly the given user
    pub fn require_identity(&self, user_id: &str) -> ModerationResult<()> {
        if !self.is_anonymous() && self.user_id == user_id {
            Ok(())
        } else {
            Err(ModerationError::Authorization(
                "actor does not match the required identity".to_string(),
            ))
        }
    }
}
