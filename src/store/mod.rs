//! Persistence for identities and sessions.
//!
//! The rest of the crate only sees the [`TokenStore`] trait. Implementations
//! must be safe to share across request tasks; the authenticator issues
//! independent, unordered queries per request with no caching in front.
//!
//! Reads that depend on the clock take an explicit `now`. A session matches
//! only while `expires_at > now`, so a session created at `T` with lifetime
//! `L` resolves for `now < T + L` and never at `now >= T + L`. Stores may
//! truncate timestamps; the `expires_at` they return is the one enforced.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Identity, NewSession, ProviderProfile, Session};

pub use sqlite::SqliteTokenStore;

/// Errors raised by a token store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("stored value is invalid: {0}")]
    Corrupt(String),
}

/// Convenience type alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Identity written by [`TokenStore::upsert_identity`].
#[derive(Debug, Clone)]
pub struct IdentityUpsert {
    pub identity: Identity,
    /// `true` when no identity with this external key existed before.
    pub created: bool,
}

/// Contract between the session core and the relational store.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Insert the identity behind `profile`, or overwrite the provider-owned
    /// fields of the one already holding its external key.
    ///
    /// Must be a single atomic write: concurrent first logins for the same
    /// key all succeed and resolve to one identity.
    async fn upsert_identity(
        &self,
        profile: &ProviderProfile,
        now: DateTime<Utc>,
    ) -> StoreResult<IdentityUpsert>;

    async fn get_identity_by_id(&self, id: i64) -> StoreResult<Option<Identity>>;

    async fn get_identity_by_external_key(
        &self,
        external_id: &str,
    ) -> StoreResult<Option<Identity>>;

    /// Persist the mutable fields of `identity`, stamping `updated_at`.
    ///
    /// Fails with [`StoreError::NotFound`] when the row no longer exists.
    async fn update_identity(&self, identity: &Identity, now: DateTime<Utc>)
    -> StoreResult<Identity>;

    /// Delete an identity and every session that belongs to it.
    async fn delete_identity(&self, id: i64) -> StoreResult<()>;

    async fn create_session(&self, session: NewSession) -> StoreResult<Session>;

    /// Look up a session by token, ignoring sessions that expired at `now`.
    async fn get_session_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>>;

    /// Resolve the identity behind an unexpired session token in one query.
    async fn get_identity_by_session_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Identity>>;

    /// Delete a session by token. Deleting an unknown token is not an error.
    async fn delete_session(&self, token: &str) -> StoreResult<()>;

    /// Remove every session whose expiry is at or before `now`.
    ///
    /// Returns the number of sessions removed.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
