/// Refresh Session Matching
///
/// A refresh token is only honoured while it is the one the user's record
/// points at. The record holds a SHA-256 fingerprint of that token rather
/// than the token itself, so a leaked row cannot be replayed.
///
/// Issuing a new refresh token and storing its fingerprint supersedes every
/// older token at once (rotation); clearing the fingerprint revokes them all
/// (logout).

use sha2::{Digest, Sha256};

use crate::auth::claims::RefreshClaims;
use crate::auth::jwt::TokenVerifier;
use crate::error::{AppError, AuthError};

/// Fingerprint stored as the user's session value
pub fn session_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl TokenVerifier {
    /// Validate a refresh token against the stored session value.
    ///
    /// # Errors
    /// - `Expired` / `Unauthenticated` / `Malformed` from the signature check
    /// - `Revoked` if the signature is fine but `stored_value` is absent or
    ///   belongs to a different token
    pub fn verify_refresh_token(
        &self,
        token: &str,
        stored_value: Option<&str>,
    ) -> Result<RefreshClaims, AppError> {
        let claims = self.decode_refresh_token(token)?;

        match stored_value {
            Some(stored) if stored == session_fingerprint(token) => Ok(claims),
            Some(_) => {
                tracing::warn!(user_id = %claims.sub, "Superseded refresh token presented");
                Err(AppError::Auth(AuthError::Revoked))
            }
            None => {
                tracing::warn!(user_id = %claims.sub, "Refresh token presented with no live session");
                Err(AppError::Auth(AuthError::Revoked))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::tests::{test_config, test_user};
    use crate::auth::jwt::TokenIssuer;

    #[test]
    fn test_token_fingerprint() {
        let first = session_fingerprint("token-a");

        assert_eq!(first, session_fingerprint("token-a"));
        assert_ne!(first, session_fingerprint("token-b"));
        assert_ne!(first, "token-a");
        // SHA-256 hex
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_matching_session_is_accepted() {
        let config = test_config();
        let user = test_user();
        let token = TokenIssuer::new(&config).unwrap().issue_refresh_token(&user).unwrap();
        let stored = session_fingerprint(&token);

        let claims = TokenVerifier::new(&config)
            .unwrap()
            .verify_refresh_token(&token, Some(&stored))
            .expect("current refresh token should verify");

        assert_eq!(claims.user_id().unwrap(), user.id);
    }

    #[test]
    fn test_superseded_token_is_revoked() {
        let config = test_config();
        let user = test_user();
        let issuer = TokenIssuer::new(&config).unwrap();
        let old = issuer.issue_refresh_token(&user).unwrap();
        let new = issuer.issue_refresh_token(&user).unwrap();
        let stored = session_fingerprint(&new);

        let err = TokenVerifier::new(&config)
            .unwrap()
            .verify_refresh_token(&old, Some(&stored))
            .unwrap_err();

        assert_eq!(err.auth_kind(), Some(AuthError::Revoked));
    }

    #[test]
    fn test_cleared_session_is_revoked() {
        let config = test_config();
        let token = TokenIssuer::new(&config)
            .unwrap()
            .issue_refresh_token(&test_user())
            .unwrap();

        let err = TokenVerifier::new(&config)
            .unwrap()
            .verify_refresh_token(&token, None)
            .unwrap_err();

        assert_eq!(err.auth_kind(), Some(AuthError::Revoked));
    }

    #[test]
    fn test_bad_signature_wins_over_session_check() {
        let config = test_config();
        let err = TokenVerifier::new(&config)
            .unwrap()
            .verify_refresh_token("garbage", None)
            .unwrap_err();

        assert_eq!(err.auth_kind(), Some(AuthError::Malformed));
    }
}
