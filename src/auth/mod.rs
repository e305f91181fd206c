/// Authentication module
///
/// Password hashing, JWT issuance/validation, and refresh session matching.

mod claims;
mod jwt;
mod password;
mod refresh_token;

pub use claims::{AccessClaims, RefreshClaims};
pub use jwt::{TokenIssuer, TokenPair, TokenVerifier};
pub use password::{validate_password_strength, PasswordHasher};
pub use refresh_token::session_fingerprint;
