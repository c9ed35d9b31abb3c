use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::Serialize;

/// Fixed lifetime of a login session (30 days).
pub const SESSION_LIFETIME: Duration = Duration::days(30);

/// A server-issued, time-bounded bearer credential.
///
/// Sessions are never mutated after creation: they are deleted on sign-out,
/// on account deletion, or by the expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: i64,
    pub identity_id: i64,
    #[serde(skip_serializing)]
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session is valid strictly before its expiry instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Parameters for inserting a new session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub identity_id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewSession {
    /// Build a session starting at `now` that lasts [`SESSION_LIFETIME`].
    ///
    /// `now` is truncated to whole microseconds, the precision stores keep,
    /// so the expiry handed out is the expiry enforced.
    pub fn starting_at(identity_id: i64, token: String, now: DateTime<Utc>) -> Self {
        let now = now.trunc_subsecs(6);
        Self {
            identity_id,
            token,
            created_at: now,
            expires_at: now + SESSION_LIFETIME,
        }
    }
}
