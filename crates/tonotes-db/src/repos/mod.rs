//! Repository interfaces and their MongoDB implementations
//!
//! Services hold `Arc<dyn UserRepository>` / `Arc<dyn SessionRepository>` so
//! tests and alternative backends can be swapped in behind the same calls.

mod session;
mod user;

pub use session::MongoSessionRepo;
pub use user::MongoUserRepo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::{Session, User};

/// Operations the auth core needs on user records
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user. Fails with `DbError::Duplicate("username" | "email")`.
    async fn create(&self, user: &User) -> DbResult<()>;

    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> DbResult<Option<User>>;

    async fn update_password(&self, id: Uuid, digest: &str, changed_at: DateTime<Utc>) -> DbResult<bool>;

    /// Fails with `DbError::Duplicate("email")` if another account owns the address.
    async fn update_email(&self, id: Uuid, email: &str, changed_at: DateTime<Utc>) -> DbResult<bool>;

    /// Store the secret and recovery hashes only if 2FA is currently disabled.
    /// Returns false when the condition did not match.
    async fn enable_two_factor(&self, id: Uuid, secret: &str, recovery_hashes: &[String]) -> DbResult<bool>;

    /// Clear the secret and recovery hashes.
    async fn disable_two_factor(&self, id: Uuid) -> DbResult<bool>;

    /// Atomically remove one recovery hash if present.
    /// Returns the number of hashes left, or `None` if the hash was not there.
    async fn consume_recovery_code(&self, id: Uuid, hash: &str) -> DbResult<Option<usize>>;

    async fn delete(&self, id: Uuid) -> DbResult<bool>;
}

/// Operations the session registry needs on session records
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &Session) -> DbResult<()>;

    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<Session>>;

    /// Active, unexpired sessions ordered by `last_activity_at` descending.
    async fn list_active(&self, user_id: Uuid, now: DateTime<Utc>) -> DbResult<Vec<Session>>;

    async fn count_active(&self, user_id: Uuid, now: DateTime<Utc>) -> DbResult<u64>;

    /// Raise `last_activity_at` to `now` on an active, unexpired session.
    /// Never lowers it. Returns the updated record, or `None` if not live.
    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> DbResult<Option<Session>>;

    /// Flip `active` to false. Returns false if it already was.
    async fn deactivate(&self, id: Uuid) -> DbResult<bool>;

    /// Deactivate every active session of the user; returns how many changed.
    async fn deactivate_all(&self, user_id: Uuid) -> DbResult<u64>;

    /// Persist mutated fields. An inactive record is never reactivated and
    /// `last_activity_at` only moves forward.
    async fn update(&self, session: &Session) -> DbResult<bool>;

    async fn delete_for_user(&self, user_id: Uuid) -> DbResult<u64>;

    /// Remove records whose `expires_at` is not after `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> DbResult<u64>;
}
