//! SQLite implementation of [`TokenStore`] on top of `sqlx`.
//!
//! Timestamps are stored as unix microseconds so expiry comparisons happen on
//! integers inside SQL rather than on formatted text. Values returned by the
//! store carry the same precision, so a returned `expires_at` compares
//! against a query instant exactly as the stored integer does.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use super::{IdentityUpsert, StoreError, StoreResult, TokenStore};
use crate::models::{Identity, NewSession, ProviderProfile, Session};

/// Tables required by the session core, created on connect if missing.
const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id    TEXT    NOT NULL UNIQUE,
        email          TEXT    NOT NULL,
        name           TEXT    NOT NULL,
        given_name     TEXT,
        family_name    TEXT,
        picture        TEXT,
        locale         TEXT,
        verified_email INTEGER NOT NULL DEFAULT 0,
        login_count    INTEGER NOT NULL DEFAULT 1,
        created_at     INTEGER NOT NULL,
        updated_at     INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        token      TEXT    NOT NULL UNIQUE,
        expires_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at)",
];

const IDENTITY_COLUMNS: &str = "u.id, u.external_id, u.email, u.name, u.given_name, \
     u.family_name, u.picture, u.locale, u.verified_email, u.created_at, u.updated_at";

/// Default connection pool size for file-backed databases.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// How long a query waits for a free pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(FromRow)]
struct IdentityRow {
    id: i64,
    external_id: String,
    email: String,
    name: String,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
    locale: Option<String>,
    verified_email: bool,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = StoreError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        Ok(Identity {
            id: row.id,
            external_id: row.external_id,
            email: row.email,
            name: row.name,
            given_name: row.given_name,
            family_name: row.family_name,
            picture: row.picture,
            locale: row.locale,
            verified_email: row.verified_email,
            created_at: from_micros(row.created_at)?,
            updated_at: from_micros(row.updated_at)?,
        })
    }
}

/// Row returned by the login upsert.
#[derive(FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    identity: IdentityRow,
    login_count: i64,
}

#[derive(FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    token: String,
    expires_at: i64,
    created_at: i64,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row.id,
            identity_id: row.user_id,
            token: row.token,
            created_at: from_micros(row.created_at)?,
            expires_at: from_micros(row.expires_at)?,
        })
    }
}

fn from_micros(us: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {us} out of range")))
}

/// Token store backed by a SQLite connection pool.
#[derive(Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the URL is invalid, the file cannot
    /// be opened, or schema creation fails.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        info!(url, "Token store ready");
        Ok(store)
    }

    /// Open a private in-memory database.
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool is
    /// pinned to a single connection that is never recycled.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Token store schema ensured");
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn upsert_identity(
        &self,
        profile: &ProviderProfile,
        now: DateTime<Utc>,
    ) -> StoreResult<IdentityUpsert> {
        let row = sqlx::query_as::<_, UpsertRow>(
            r#"
            INSERT INTO users (external_id, email, name, given_name, family_name,
                               picture, locale, verified_email, login_count,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                email          = excluded.email,
                name           = excluded.name,
                given_name     = excluded.given_name,
                family_name    = excluded.family_name,
                picture        = excluded.picture,
                locale         = excluded.locale,
                verified_email = excluded.verified_email,
                login_count    = users.login_count + 1,
                updated_at     = excluded.updated_at
            RETURNING id, external_id, email, name, given_name, family_name, picture,
                      locale, verified_email, login_count, created_at, updated_at
            "#,
        )
        .bind(&profile.external_id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.given_name)
        .bind(&profile.family_name)
        .bind(&profile.picture)
        .bind(&profile.locale)
        .bind(profile.verified_email)
        .bind(now.timestamp_micros())
        .bind(now.timestamp_micros())
        .fetch_one(&self.pool)
        .await?;

        let created = row.login_count == 1;
        let identity = Identity::try_from(row.identity)?;
        debug!(identity_id = identity.id, created, "Identity upserted");

        Ok(IdentityUpsert { identity, created })
    }

    async fn get_identity_by_id(&self, id: i64) -> StoreResult<Option<Identity>> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM users u WHERE u.id = ?");
        sqlx::query_as::<_, IdentityRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Identity::try_from)
            .transpose()
    }

    async fn get_identity_by_external_key(
        &self,
        external_id: &str,
    ) -> StoreResult<Option<Identity>> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM users u WHERE u.external_id = ?");
        sqlx::query_as::<_, IdentityRow>(&query)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Identity::try_from)
            .transpose()
    }

    async fn update_identity(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> StoreResult<Identity> {
        let now_us = now.timestamp_micros();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = ?, name = ?, given_name = ?, family_name = ?, picture = ?,
                locale = ?, verified_email = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&identity.email)
        .bind(&identity.name)
        .bind(&identity.given_name)
        .bind(&identity.family_name)
        .bind(&identity.picture)
        .bind(&identity.locale)
        .bind(identity.verified_email)
        .bind(now_us)
        .bind(identity.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("identity"));
        }

        Ok(Identity {
            updated_at: from_micros(now_us)?,
            ..identity.clone()
        })
    }

    async fn delete_identity(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let sessions = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let users = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if users.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound("identity"));
        }

        tx.commit().await?;
        debug!(
            identity_id = id,
            sessions_removed = sessions.rows_affected(),
            "Identity deleted"
        );
        Ok(())
    }

    async fn create_session(&self, session: NewSession) -> StoreResult<Session> {
        let created_us = session.created_at.timestamp_micros();
        let expires_us = session.expires_at.timestamp_micros();

        let result = sqlx::query(
            "INSERT INTO sessions (user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session.identity_id)
        .bind(&session.token)
        .bind(expires_us)
        .bind(created_us)
        .execute(&self.pool)
        .await?;

        Ok(Session {
            id: result.last_insert_rowid(),
            identity_id: session.identity_id,
            token: session.token,
            created_at: from_micros(created_us)?,
            expires_at: from_micros(expires_us)?,
        })
    }

    async fn get_session_by_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, token, expires_at, created_at
            FROM sessions
            WHERE token = ? AND expires_at > ?
            "#,
        )
        .bind(token)
        .bind(now.timestamp_micros())
        .fetch_optional(&self.pool)
        .await?
        .map(Session::try_from)
        .transpose()
    }

    async fn get_identity_by_session_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Identity>> {
        let query = format!(
            "SELECT {IDENTITY_COLUMNS} FROM users u \
             INNER JOIN sessions s ON s.user_id = u.id \
             WHERE s.token = ? AND s.expires_at > ?"
        );
        sqlx::query_as::<_, IdentityRow>(&query)
            .bind(token)
            .bind(now.timestamp_micros())
            .fetch_optional(&self.pool)
            .await?
            .map(Identity::try_from)
            .transpose()
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now.timestamp_micros())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::models::SESSION_LIFETIME;

    fn profile(external_id: &str) -> ProviderProfile {
        ProviderProfile {
            external_id: external_id.to_string(),
            email: format!("{external_id}@example.com"),
            verified_email: true,
            name: "Test User".to_string(),
            given_name: Some("Test".to_string()),
            family_name: None,
            picture: None,
            locale: None,
        }
    }

    async fn store_with_identity() -> (SqliteTokenStore, Identity) {
        let store = SqliteTokenStore::in_memory().await.unwrap();
        let upsert = store
            .upsert_identity(&profile("g-1"), Utc::now())
            .await
            .unwrap();
        assert!(upsert.created);
        (store, upsert.identity)
    }

    #[tokio::test]
    async fn test_create_and_fetch_identity() {
        let (store, identity) = store_with_identity().await;

        let by_key = store.get_identity_by_external_key("g-1").await.unwrap();
        let by_id = store.get_identity_by_id(identity.id).await.unwrap();

        assert_eq!(by_key.as_ref(), Some(&identity));
        assert_eq!(by_id, Some(identity));
        assert!(store.get_identity_by_external_key("g-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_existing_key_updates_in_place() {
        let (store, identity) = store_with_identity().await;
        let mut changed = profile("g-1");
        changed.email = "moved@example.com".to_string();
        changed.given_name = None;

        let upsert = store.upsert_identity(&changed, Utc::now()).await.unwrap();

        assert!(!upsert.created);
        assert_eq!(upsert.identity.id, identity.id);
        assert_eq!(upsert.identity.email, "moved@example.com");
        assert_eq!(upsert.identity.given_name, None);
        assert_eq!(upsert.identity.created_at, identity.created_at);

        let stored = store.get_identity_by_id(identity.id).await.unwrap().unwrap();
        assert_eq!(stored, upsert.identity);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_share_one_identity() {
        let store = SqliteTokenStore::in_memory().await.unwrap();
        let now = Utc::now();
        let p = profile("g-race");

        let (a, b) = tokio::join!(store.upsert_identity(&p, now), store.upsert_identity(&p, now));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.identity.id, b.identity.id);
        assert!(a.created ^ b.created, "exactly one write creates the identity");
    }

    #[tokio::test]
    async fn test_update_missing_identity_is_not_found() {
        let (store, mut identity) = store_with_identity().await;
        identity.id += 100;
        let result = store.update_identity(&identity, Utc::now()).await;
        assert!(matches!(result, Err(StoreError::NotFound("identity"))));
    }

    #[tokio::test]
    async fn test_session_expiry_boundary_is_strict() {
        let (store, identity) = store_with_identity().await;
        let start = Utc::now();
        store
            .create_session(NewSession::starting_at(identity.id, "tok".into(), start))
            .await
            .unwrap();

        let expiry = start + SESSION_LIFETIME;
        let just_before = expiry - ChronoDuration::microseconds(1);

        assert!(store.get_session_by_token("tok", just_before).await.unwrap().is_some());
        assert!(store.get_session_by_token("tok", expiry).await.unwrap().is_none());
        assert!(
            store
                .get_identity_by_session_token("tok", expiry)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_nanosecond_start_keeps_full_lifetime() {
        let (store, identity) = store_with_identity().await;
        let start = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let new = NewSession::starting_at(identity.id, "tok".into(), start);
        let expiry = new.expires_at;

        let session = store.create_session(new).await.unwrap();
        assert_eq!(session.expires_at, expiry);

        let last_instant = expiry - ChronoDuration::nanoseconds(1);
        assert!(store.get_session_by_token("tok", last_instant).await.unwrap().is_some());
        assert!(store.get_session_by_token("tok", expiry).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_by_session_token_joins() {
        let (store, identity) = store_with_identity().await;
        let now = Utc::now();
        store
            .create_session(NewSession::starting_at(identity.id, "tok".into(), now))
            .await
            .unwrap();

        let resolved = store.get_identity_by_session_token("tok", now).await.unwrap();
        assert_eq!(resolved.map(|i| i.id), Some(identity.id));
    }

    #[tokio::test]
    async fn test_delete_identity_cascades_sessions() {
        let (store, identity) = store_with_identity().await;
        let now = Utc::now();
        for token in ["a", "b"] {
            store
                .create_session(NewSession::starting_at(identity.id, token.into(), now))
                .await
                .unwrap();
        }

        store.delete_identity(identity.id).await.unwrap();

        assert!(store.get_session_by_token("a", now).await.unwrap().is_none());
        assert!(store.get_session_by_token("b", now).await.unwrap().is_none());
        assert!(matches!(
            store.delete_identity(identity.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_expired_sessions_counts_removed() {
        let (store, identity) = store_with_identity().await;
        let now = Utc::now();
        let expired = NewSession {
            identity_id: identity.id,
            token: "old".into(),
            created_at: now - ChronoDuration::days(31),
            expires_at: now - ChronoDuration::days(1),
        };
        store.create_session(expired).await.unwrap();
        store
            .create_session(NewSession::starting_at(identity.id, "new".into(), now))
            .await
            .unwrap();

        assert_eq!(store.delete_expired_sessions(now).await.unwrap(), 1);
        assert!(store.get_session_by_token("new", now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_unknown_session_is_ok() {
        let (store, _) = store_with_identity().await;
        assert!(store.delete_session("missing").await.is_ok());
    }
}
