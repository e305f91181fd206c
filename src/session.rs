/// Session Controller
///
/// Orchestrates the credential and token lifecycle:
///
/// ```text
/// Anonymous --login--> Authenticated --refresh--> Authenticated (rotated)
///                            |
///                            +--logout--> LoggedOut
/// ```
///
/// Every operation either completes all of its writes or none of them; a
/// failed operation never leaves a half-updated session behind.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::{
    session_fingerprint, validate_password_strength, PasswordHasher, TokenIssuer, TokenPair,
    TokenVerifier,
};
use crate::configuration::Settings;
use crate::error::{AppError, AuthError, ConfigError, ValidationError};
use crate::models::{NewUser, ProfileUpdate, PublicUser, User};
use crate::store::CredentialStore;
use crate::validators::{is_valid_email, is_valid_full_name, is_valid_media_url, is_valid_username};

/// Raw registration input
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub avatar: String,
    pub cover_image: Option<String>,
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

pub struct SessionController {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    issuer: TokenIssuer,
    verifier: TokenVerifier,
    revoke_sessions_on_password_change: bool,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        issuer: TokenIssuer,
        verifier: TokenVerifier,
        revoke_sessions_on_password_change: bool,
    ) -> Self {
        Self {
            store,
            hasher,
            issuer,
            verifier,
            revoke_sessions_on_password_change,
        }
    }

    /// Build the controller from validated settings
    pub fn from_settings(
        store: Arc<dyn CredentialStore>,
        settings: &Settings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;

        Ok(Self::new(
            store,
            PasswordHasher::new(settings.auth.bcrypt_cost),
            TokenIssuer::new(&settings.jwt)?,
            TokenVerifier::new(&settings.jwt)?,
            settings.auth.revoke_sessions_on_password_change,
        ))
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Access token lifetime in seconds
    pub fn access_token_expiry(&self) -> i64 {
        self.issuer.access_token_expiry()
    }

    pub fn refresh_token_expiry(&self) -> i64 {
        self.issuer.refresh_token_expiry()
    }

    /// Create an account. The new user starts without a session.
    pub async fn register(&self, registration: Registration) -> Result<PublicUser, AppError> {
        let username = is_valid_username(&registration.username)?;
        let email = is_valid_email(&registration.email)?;
        let full_name = is_valid_full_name(&registration.full_name)?;
        let avatar = is_valid_media_url("avatar", &registration.avatar)?;
        let cover_image = registration
            .cover_image
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| is_valid_media_url("cover_image", url))
            .transpose()?;
        validate_password_strength(&registration.password)?;

        if self.store.find_user_by_handle_or_email(&username).await?.is_some()
            || self.store.find_user_by_handle_or_email(&email).await?.is_some()
        {
            return Err(AppError::conflict("User with email or username already exists"));
        }

        let password_hash = self.hasher.hash(&registration.password)?;
        let user = self
            .store
            .create_user(NewUser {
                username,
                email,
                full_name,
                avatar,
                cover_image,
                password_hash,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(PublicUser::from(&user))
    }

    /// Anonymous -> Authenticated.
    ///
    /// Tokens are only handed out once the refresh fingerprint is stored.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginOutcome, AppError> {
        if identifier.trim().is_empty() {
            return Err(ValidationError::EmptyField("username or email".to_string()).into());
        }

        let user = self
            .store
            .find_user_by_handle_or_email(identifier)
            .await?
            .ok_or_else(AppError::user_not_found)?;

        if !self.hasher.verify(password, &user.password_hash) {
            tracing::warn!(user_id = %user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.issuer.issue_pair(&user)?;
        let fingerprint = session_fingerprint(&tokens.refresh_token);
        if !self.store.update_session_value(user.id, Some(&fingerprint)).await? {
            // Deleted between lookup and write
            return Err(AppError::user_not_found());
        }

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome {
            user: PublicUser::from(&user),
            tokens,
        })
    }

    /// Exchange a refresh token for a new pair, rotating the stored session.
    ///
    /// The presented token is single-use: the swap only succeeds from its own
    /// fingerprint, so a concurrent refresh with the same token loses with
    /// `Revoked`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self.verifier.decode_refresh_token(refresh_token)?;
        let user_id = claims.user_id()?;

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AppError::Auth(AuthError::Revoked))?;

        self.verifier
            .verify_refresh_token(refresh_token, user.session_value.as_deref())?;

        let tokens = self.issuer.issue_pair(&user)?;
        let swapped = self
            .store
            .swap_session_value(
                user.id,
                &session_fingerprint(refresh_token),
                &session_fingerprint(&tokens.refresh_token),
            )
            .await?;

        if !swapped {
            tracing::warn!(user_id = %user.id, "Refresh lost the rotation race");
            return Err(AuthError::Revoked.into());
        }

        tracing::info!(user_id = %user.id, "Session refreshed");
        Ok(tokens)
    }

    /// Authenticated -> LoggedOut. Logging out twice is fine.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        if !self.store.update_session_value(user_id, None).await? {
            return Err(AppError::user_not_found());
        }

        tracing::info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Replace the password after checking the old one.
    ///
    /// With `revoke_sessions_on_password_change` the refresh session is
    /// cleared in the same write.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = self.load_user(user_id).await?;

        if !self.hasher.verify(old_password, &user.password_hash) {
            tracing::warn!(user_id = %user_id, "Password change with wrong old password");
            return Err(AuthError::InvalidCredentials.into());
        }

        validate_password_strength(new_password)?;
        let digest = self.hasher.hash(new_password)?;

        if !self
            .store
            .update_secret(user_id, &digest, self.revoke_sessions_on_password_change)
            .await?
        {
            return Err(AppError::user_not_found());
        }

        tracing::info!(
            user_id = %user_id,
            sessions_revoked = self.revoke_sessions_on_password_change,
            "Password changed"
        );
        Ok(())
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<PublicUser, AppError> {
        let user = self.load_user(user_id).await?;
        Ok(PublicUser::from(&user))
    }

    /// Update display name and/or email. At least one must be given.
    pub async fn update_account_details(
        &self,
        user_id: Uuid,
        full_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<PublicUser, AppError> {
        let update = ProfileUpdate {
            full_name: full_name.map(is_valid_full_name).transpose()?,
            email: email.map(is_valid_email).transpose()?,
            ..Default::default()
        };

        if update.is_empty() {
            return Err(ValidationError::EmptyField("full_name or email".to_string()).into());
        }

        self.apply_profile_update(user_id, update).await
    }

    /// Point the avatar at a new media URL
    pub async fn update_avatar(&self, user_id: Uuid, url: &str) -> Result<PublicUser, AppError> {
        let update = ProfileUpdate {
            avatar: Some(is_valid_media_url("avatar", url)?),
            ..Default::default()
        };
        self.apply_profile_update(user_id, update).await
    }

    pub async fn update_cover_image(
        &self,
        user_id: Uuid,
        url: &str,
    ) -> Result<PublicUser, AppError> {
        let update = ProfileUpdate {
            cover_image: Some(is_valid_media_url("cover_image", url)?),
            ..Default::default()
        };
        self.apply_profile_update(user_id, update).await
    }

    async fn apply_profile_update(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<PublicUser, AppError> {
        let user = self
            .store
            .update_profile(user_id, update)
            .await?
            .ok_or_else(AppError::user_not_found)?;

        tracing::info!(user_id = %user_id, "Profile updated");
        Ok(PublicUser::from(&user))
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(AppError::user_not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::JwtSettings;
    use crate::error::DatabaseError;
    use crate::store::InMemoryCredentialStore;

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            access_token_secret: "access-secret-key-at-least-32-characters".to_string(),
            refresh_token_secret: "refresh-secret-key-at-least-32-characters".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 864000,
            issuer: "test".to_string(),
        }
    }

    fn controller(store: Arc<InMemoryCredentialStore>) -> SessionController {
        let jwt = jwt_settings();
        SessionController::new(
            store,
            PasswordHasher::new(4),
            TokenIssuer::new(&jwt).unwrap(),
            TokenVerifier::new(&jwt).unwrap(),
            true,
        )
    }

    fn alice() -> Registration {
        Registration {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            full_name: "Alice Liddell".to_string(),
            password: "Secr3t!".to_string(),
            avatar: "https://cdn.example.com/alice.png".to_string(),
            cover_image: None,
        }
    }

    async fn stored(store: &InMemoryCredentialStore, user_id: Uuid) -> User {
        store.find_user_by_id(user_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_register_never_stores_plaintext() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store.clone());

        let user = sessions.register(alice()).await.unwrap();
        let record = stored(&store, user.id).await;

        assert_ne!(record.password_hash, "Secr3t!");
        assert!(record.session_value.is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_conflicts() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store);
        sessions.register(alice()).await.unwrap();

        let mut again = alice();
        again.username = "ALICE".to_string();
        again.email = "other@example.com".to_string();
        let err = sessions.register(again).await.unwrap_err();

        assert!(matches!(err, AppError::Database(DatabaseError::UniqueConstraintViolation(_))));
    }

    #[tokio::test]
    async fn test_login_stores_exactly_one_session() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store.clone());
        let user = sessions.register(alice()).await.unwrap();

        let first = sessions.login("alice", "Secr3t!").await.unwrap();
        assert_eq!(
            stored(&store, user.id).await.session_value,
            Some(session_fingerprint(&first.tokens.refresh_token))
        );

        let second = sessions.login("alice@example.com", "Secr3t!").await.unwrap();
        assert_eq!(
            stored(&store, user.id).await.session_value,
            Some(session_fingerprint(&second.tokens.refresh_token))
        );

        let err = sessions.refresh(&first.tokens.refresh_token).await.unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::Revoked));
    }

    #[tokio::test]
    async fn test_login_failures() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store.clone());
        let user = sessions.register(alice()).await.unwrap();

        let err = sessions.login("nobody", "Secr3t!").await.unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::NotFound(_))));

        let err = sessions.login("alice", "wrong").await.unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::InvalidCredentials));
        assert!(stored(&store, user.id).await.session_value.is_none());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_old_token_is_revoked() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store.clone());
        let user = sessions.register(alice()).await.unwrap();

        let r1 = sessions.login("alice", "Secr3t!").await.unwrap().tokens.refresh_token;
        let pair = sessions.refresh(&r1).await.unwrap();
        let r2 = pair.refresh_token;

        assert_ne!(r1, r2);
        assert_eq!(
            stored(&store, user.id).await.session_value,
            Some(session_fingerprint(&r2))
        );

        let err = sessions.refresh(&r1).await.unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::Revoked));
        // The failed attempt left R2 in place
        assert_eq!(
            stored(&store, user.id).await.session_value,
            Some(session_fingerprint(&r2))
        );

        let r3 = sessions.refresh(&r2).await.unwrap().refresh_token;
        assert_ne!(r2, r3);
    }

    #[tokio::test]
    async fn test_refreshed_access_token_verifies() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store);
        let user = sessions.register(alice()).await.unwrap();
        let login = sessions.login("alice", "Secr3t!").await.unwrap();

        let pair = sessions.refresh(&login.tokens.refresh_token).await.unwrap();
        let claims = sessions.verifier().verify_access_token(&pair.access_token).unwrap();

        assert_eq!(claims.user_id().unwrap(), user.id);
        assert_eq!(claims.full_name, "Alice Liddell");
    }

    #[tokio::test]
    async fn test_refresh_rejects_garbage_without_touching_state() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store.clone());
        let user = sessions.register(alice()).await.unwrap();
        let login = sessions.login("alice", "Secr3t!").await.unwrap();

        let err = sessions.refresh("not-a-token").await.unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::Malformed));

        let err = sessions.refresh(&login.tokens.access_token).await.unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::Unauthenticated));

        assert_eq!(
            stored(&store, user.id).await.session_value,
            Some(session_fingerprint(&login.tokens.refresh_token))
        );
    }

    #[tokio::test]
    async fn test_logout_revokes_and_is_idempotent() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store.clone());
        let user = sessions.register(alice()).await.unwrap();
        let login = sessions.login("alice", "Secr3t!").await.unwrap();

        sessions.logout(user.id).await.unwrap();
        assert!(stored(&store, user.id).await.session_value.is_none());
        sessions.logout(user.id).await.unwrap();

        let err = sessions.refresh(&login.tokens.refresh_token).await.unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::Revoked));
    }

    #[tokio::test]
    async fn test_change_password_with_wrong_old_password() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store.clone());
        let user = sessions.register(alice()).await.unwrap();
        let before = stored(&store, user.id).await.password_hash;

        let err = sessions
            .change_password(user.id, "Wr0ng!", "N3wSecret")
            .await
            .unwrap_err();

        assert_eq!(err.auth_kind(), Some(AuthError::InvalidCredentials));
        assert_eq!(stored(&store, user.id).await.password_hash, before);
    }

    #[tokio::test]
    async fn test_change_password_revokes_sessions() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store.clone());
        let user = sessions.register(alice()).await.unwrap();
        let login = sessions.login("alice", "Secr3t!").await.unwrap();

        sessions.change_password(user.id, "Secr3t!", "N3wSecret").await.unwrap();

        let err = sessions.refresh(&login.tokens.refresh_token).await.unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::Revoked));

        let err = sessions.login("alice", "Secr3t!").await.unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::InvalidCredentials));
        assert!(sessions.login("alice", "N3wSecret").await.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_can_keep_sessions() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let jwt = jwt_settings();
        let sessions = SessionController::new(
            store.clone(),
            PasswordHasher::new(4),
            TokenIssuer::new(&jwt).unwrap(),
            TokenVerifier::new(&jwt).unwrap(),
            false,
        );
        let user = sessions.register(alice()).await.unwrap();
        let login = sessions.login("alice", "Secr3t!").await.unwrap();

        sessions.change_password(user.id, "Secr3t!", "N3wSecret").await.unwrap();

        assert!(sessions.refresh(&login.tokens.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_one_winner() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = Arc::new(controller(store));
        sessions.register(alice()).await.unwrap();
        let token = sessions.login("alice", "Secr3t!").await.unwrap().tokens.refresh_token;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sessions = sessions.clone();
                let token = token.clone();
                tokio::spawn(async move { sessions.refresh(&token).await })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(err) => assert_eq!(err.auth_kind(), Some(AuthError::Revoked)),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_update_account_details() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store);
        let user = sessions.register(alice()).await.unwrap();

        let err = sessions.update_account_details(user.id, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let updated = sessions
            .update_account_details(user.id, Some("Alice L."), Some("New@Example.com"))
            .await
            .unwrap();
        assert_eq!(updated.full_name, "Alice L.");
        assert_eq!(updated.email, "new@example.com");

        let updated = sessions
            .update_cover_image(user.id, "https://cdn.example.com/cover.png")
            .await
            .unwrap();
        assert_eq!(updated.cover_image.as_deref(), Some("https://cdn.example.com/cover.png"));
    }

    #[tokio::test]
    async fn test_register_rejects_password_past_bcrypt_limit() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store.clone());

        let mut long = alice();
        long.password = format!("A1{}", "a".repeat(71));
        assert_eq!(long.password.len(), 73);

        let err = sessions.register(long).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.find_user_by_handle_or_email("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_with_expired_token_keeps_session() {
        use crate::auth::RefreshClaims;
        use jsonwebtoken::{encode, EncodingKey, Header};

        let store = Arc::new(InMemoryCredentialStore::new());
        let sessions = controller(store.clone());
        let user = sessions.register(alice()).await.unwrap();
        let login = sessions.login("alice", "Secr3t!").await.unwrap();

        let mut claims = RefreshClaims::new(user.id, 3600, jwt_settings().issuer);
        claims.iat -= 7200;
        claims.exp = claims.iat + 60;
        let expired = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(jwt_settings().refresh_token_secret.as_bytes()),
        )
        .unwrap();

        let err = sessions.refresh(&expired).await.unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::Expired));
        assert_eq!(
            stored(&store, user.id).await.session_value,
            Some(session_fingerprint(&login.tokens.refresh_token))
        );

        // The live token still works
        assert!(sessions.refresh(&login.tokens.refresh_token).await.is_ok());
    }
}
