mod auth;
mod health;
mod home;
mod settings;

pub use auth::{google_callback, google_login, sign_out};
pub use health::health_check;
pub use home::{SIGN_IN_PATH, home, me};
pub use settings::{SETTINGS_PATH, delete_account, update_profile};
