mod auth;
mod cookies;
mod health_check;
mod users;

pub use auth::{login, logout, refresh, register};
pub use cookies::{CookieSettings, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
pub use health_check::health_check;
pub use users::{change_password, current_user, update_account, update_avatar, update_cover_image};
