//! Completion of a successful provider login.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::auth::generate_token;
use crate::metrics;
use crate::models::{Identity, NewSession, ProviderProfile, Session};
use crate::store::{IdentityUpsert, StoreResult, TokenStore};

/// Result of [`complete_login`].
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub identity: Identity,
    pub session: Session,
    /// `true` when this login created the identity.
    pub created: bool,
}

/// Upsert the identity behind `profile` and open a fresh session for it.
///
/// The identity is matched by external key only. A returning user gets the
/// latest profile fields copied over and a new session alongside any they
/// already hold. Concurrent first logins for one key resolve to one identity.
pub async fn complete_login(
    store: &dyn TokenStore,
    profile: &ProviderProfile,
    now: DateTime<Utc>,
) -> StoreResult<LoginOutcome> {
    let IdentityUpsert { identity, created } = store.upsert_identity(profile, now).await?;

    let session = store
        .create_session(NewSession::starting_at(identity.id, generate_token(), now))
        .await?;

    metrics::record_login(created);
    info!(
        identity_id = identity.id,
        session_id = session.id,
        new_identity = created,
        "Login completed"
    );

    Ok(LoginOutcome {
        identity,
        session,
        created,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::SESSION_LIFETIME;
    use crate::store::SqliteTokenStore;

    fn profile(name: &str, email: &str) -> ProviderProfile {
        ProviderProfile {
            external_id: "g-123".to_string(),
            email: email.to_string(),
            verified_email: true,
            name: name.to_string(),
            given_name: None,
            family_name: None,
            picture: None,
            locale: None,
        }
    }

    #[tokio::test]
    async fn test_first_login_creates_identity_and_session() {
        let store = SqliteTokenStore::in_memory().await.unwrap();
        let now = Utc::now();

        let outcome = complete_login(&store, &profile("Ada", "ada@example.com"), now)
            .await
            .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.identity.external_id, "g-123");
        assert_eq!(outcome.session.identity_id, outcome.identity.id);
        assert!(outcome.session.token.len() >= 43);
        assert_eq!(
            outcome.session.expires_at.timestamp_millis(),
            (now + SESSION_LIFETIME).timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_concurrent_first_logins_both_succeed() {
        let store = SqliteTokenStore::in_memory().await.unwrap();
        let now = Utc::now();
        let p = profile("Ada", "ada@example.com");

        let (a, b) = tokio::join!(
            complete_login(&store, &p, now),
            complete_login(&store, &p, now)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.identity.id, b.identity.id);
        assert!(a.created ^ b.created);
        assert_ne!(a.session.token, b.session.token);
        for token in [&a.session.token, &b.session.token] {
            let identity = store.get_identity_by_session_token(token, now).await.unwrap();
            assert_eq!(identity.map(|i| i.id), Some(a.identity.id));
        }
    }

    #[tokio::test]
    async fn test_returning_login_updates_without_duplicate() {
        let store = SqliteTokenStore::in_memory().await.unwrap();
        let now = Utc::now();

        let first = complete_login(&store, &profile("Ada", "ada@example.com"), now)
            .await
            .unwrap();
        let second = complete_login(&store, &profile("Ada L.", "ada@new.example"), now)
            .await
            .unwrap();

        assert!(!second.created);
        assert_eq!(second.identity.id, first.identity.id);
        assert_eq!(second.identity.email, "ada@new.example");
        assert_ne!(second.session.token, first.session.token);

        // Both sessions stay valid
        for token in [&first.session.token, &second.session.token] {
            let identity = store.get_identity_by_session_token(token, now).await.unwrap();
            assert_eq!(identity.map(|i| i.id), Some(first.identity.id));
        }
    }
}
