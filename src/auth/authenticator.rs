//! Resolves a session bearer token to an identity.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::models::Identity;
use crate::store::TokenStore;
use crate::validation::is_well_formed_token;

/// Token-to-identity resolution over a [`TokenStore`].
///
/// Authentication never fails outward: unknown, expired, malformed and
/// dangling tokens all resolve to `None`, and store errors are logged and
/// treated the same way.
#[derive(Clone)]
pub struct SessionAuthenticator {
    store: Arc<dyn TokenStore>,
}

impl SessionAuthenticator {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Resolve `token` against the current time.
    pub async fn authenticate(&self, token: &str) -> Option<Identity> {
        self.authenticate_at(token, Utc::now()).await
    }

    /// Resolve `token` as of `now`.
    pub async fn authenticate_at(&self, token: &str, now: DateTime<Utc>) -> Option<Identity> {
        if !is_well_formed_token(token) {
            if !token.is_empty() {
                debug!(token_len = token.len(), "Ignoring malformed session token");
            }
            return None;
        }

        let session = match self.store.get_session_by_token(token, now).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("Session token unknown or expired");
                return None;
            }
            Err(e) => {
                error!(error = %e, "Session lookup failed");
                return None;
            }
        };

        match self.store.get_identity_by_id(session.identity_id).await {
            Ok(Some(identity)) => Some(identity),
            Ok(None) => {
                error!(
                    session_id = session.id,
                    identity_id = session.identity_id,
                    "Session references a missing identity"
                );
                None
            }
            Err(e) => {
                error!(error = %e, session_id = session.id, "Identity lookup failed");
                None
            }
        }
    }
}
