//! User domain type.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vitrina_core::{Email, UserId};

/// A shop account. The password hash never leaves the repository.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Normalized email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Whether the user can use the back-office.
    pub is_admin: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}
