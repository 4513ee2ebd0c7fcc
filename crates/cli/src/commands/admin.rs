//! Admin account management.
//!
//! # Usage
//!
//! ```bash
//! vitrina-cli admin create -e admin@example.com -n "Admin Name" -p '<password>'
//! ```

use thiserror::Error;

use vitrina_core::UserId;
use vitrina_server::services::{AuthError, AuthService};

use super::ConnectError;

/// Errors from admin commands.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("{0}")]
    Auth(#[from] AuthError),
}

/// Create an account with admin access.
///
/// Passwords go through the same validation and hashing as self-service
/// registration.
///
/// # Errors
///
/// Returns `AdminError::Auth` for invalid input or an email already in use.
pub async fn create_user(email: &str, name: &str, password: &str) -> Result<UserId, AdminError> {
    let pool = super::connect().await?;

    let user = AuthService::new(&pool)
        .create_user(email, name, password, true)
        .await?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );
    Ok(user.id)
}
