/// Credential Store
///
/// The persistence boundary of the service. Session logic depends only on
/// this trait, never on a query language.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewUser, ProfileUpdate, User};

pub use memory::InMemoryCredentialStore;
pub use postgres::PostgresCredentialStore;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new account with no session value.
    ///
    /// Fails with a unique-constraint error when the handle or email is taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError>;

    /// Case-insensitive lookup by handle or email
    async fn find_user_by_handle_or_email(&self, identifier: &str)
        -> Result<Option<User>, AppError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    /// Unconditionally set (or clear with `None`) the session value.
    ///
    /// Returns `false` if the user does not exist.
    async fn update_session_value(&self, user_id: Uuid, value: Option<&str>)
        -> Result<bool, AppError>;

    /// Replace the session value only if it still equals `expected`.
    ///
    /// This is the serialization point for concurrent refreshes: of two
    /// swaps from the same `expected` value at most one returns `true`.
    async fn swap_session_value(
        &self,
        user_id: Uuid,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, AppError>;

    /// Persist a new password digest, optionally clearing the session value
    /// in the same write.
    async fn update_secret(
        &self,
        user_id: Uuid,
        digest: &str,
        clear_session: bool,
    ) -> Result<bool, AppError>;

    /// Apply a profile patch and return the updated record
    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate)
        -> Result<Option<User>, AppError>;
}
