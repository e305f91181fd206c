/// JWT Token Generation and Validation
///
/// Access and refresh tokens are HS256 JWTs signed with two independent
/// secrets. Both the issuer and the verifier are built once from
/// [`JwtSettings`] and shared read-only afterwards.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;

use crate::auth::claims::{AccessClaims, RefreshClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ConfigError};
use crate::models::User;

/// A freshly minted access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Mints signed tokens. Persists nothing.
#[derive(Clone)]
pub struct TokenIssuer {
    access_key: EncodingKey,
    refresh_key: EncodingKey,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
    issuer: String,
}

impl TokenIssuer {
    /// # Errors
    /// Returns `ConfigError` if the secrets or expiries are unusable
    pub fn new(config: &JwtSettings) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            access_key: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_key: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_token_expiry: config.access_token_expiry,
            refresh_token_expiry: config.refresh_token_expiry,
            issuer: config.issuer.clone(),
        })
    }

    /// Access token lifetime in seconds
    pub fn access_token_expiry(&self) -> i64 {
        self.access_token_expiry
    }

    pub fn refresh_token_expiry(&self) -> i64 {
        self.refresh_token_expiry
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String, AppError> {
        let claims = AccessClaims::new(
            user.id,
            user.email.clone(),
            user.full_name.clone(),
            self.access_token_expiry,
            self.issuer.clone(),
        );
        sign(&claims, &self.access_key)
    }

    pub fn issue_refresh_token(&self, user: &User) -> Result<String, AppError> {
        let claims = RefreshClaims::new(user.id, self.refresh_token_expiry, self.issuer.clone());
        sign(&claims, &self.refresh_key)
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user)?,
            refresh_token: self.issue_refresh_token(user)?,
        })
    }
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, AppError> {
    encode(&Header::new(Algorithm::HS256), claims, key).map_err(|e| {
        tracing::error!(error = %e, "Token signing failed");
        AppError::Config(ConfigError::InvalidValue(format!("token signing failed: {}", e)))
    })
}

/// Checks signature, expiry and issuer of presented tokens
#[derive(Clone)]
pub struct TokenVerifier {
    access_key: DecodingKey,
    refresh_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(config: &JwtSettings) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);

        Ok(Self {
            access_key: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_key: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            validation,
        })
    }

    /// Validate an access token. No server-side state is consulted.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        decode::<AccessClaims>(token, &self.access_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Auth(classify(&e)))
    }

    /// Signature and expiry check only; the session match is
    /// [`TokenVerifier::verify_refresh_token`].
    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        decode::<RefreshClaims>(token, &self.refresh_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Auth(classify(&e)))
    }
}

fn classify(error: &jsonwebtoken::errors::Error) -> AuthError {
    let kind = match error.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::MissingRequiredClaim(_) => AuthError::Malformed,
        _ => AuthError::Unauthenticated,
    };
    tracing::debug!(error = %error, kind = ?kind, "JWT validation failed");
    kind
}
