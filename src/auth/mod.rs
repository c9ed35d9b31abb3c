//! Session authentication: tokens, cookies, the identity provider, and the
//! per-request identity carrier.

mod authenticator;
mod context;
pub mod cookies;
mod login;
mod provider;
mod token;

pub use authenticator::SessionAuthenticator;
pub use context::{
    AuthenticatedIdentity, CurrentUser, LoginRedirect, RequestIdentityExt, RequireUser, attach,
};
pub use login::{LoginOutcome, complete_login};
pub use provider::{CALLBACK_PATH, GoogleProvider, IdentityProvider, ProviderEndpoints};
pub use token::{TOKEN_BYTES, generate_token};
