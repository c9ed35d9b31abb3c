mod api;
mod identity;
mod session;

pub use api::{
    CallbackQuery, HealthResponse, HomeResponse, LoginQuery, ReloadResponse, UpdateProfileForm,
};
pub use identity::{Identity, ProviderProfile};
pub use session::{NewSession, SESSION_LIFETIME, Session};
