/// Authentication Routes
///
/// Registration, login, token refresh and logout.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AccessClaims, TokenPair};
use crate::error::{AppError, AuthError, ErrorContext, ValidationError};
use crate::models::PublicUser;
use crate::routes::cookies::{CookieSettings, REFRESH_TOKEN_COOKIE};
use crate::session::{Registration, SessionController};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    /// URL of the already uploaded avatar
    pub avatar: String,
    pub cover_image: Option<String>,
}

/// Either `username` or `email` identifies the account
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    fn bearer(tokens: TokenPair, expires_in: i64) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user: PublicUser,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.trim().is_empty())
}

/// POST /api/v1/users/register
///
/// # Errors
/// - 400: validation errors
/// - 409: username or email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    sessions: web::Data<SessionController>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let user = sessions
        .register(Registration {
            username: form.username,
            email: form.email,
            full_name: form.full_name,
            password: form.password,
            avatar: form.avatar,
            cover_image: form.cover_image,
        })
        .await?;

    Ok(HttpResponse::Created().json(user))
}

/// POST /api/v1/users/login
///
/// Returns the public user, both tokens in the body, and both tokens as
/// cookies.
///
/// # Errors
/// - 400: neither username nor email given
/// - 401: wrong password
/// - 404: no such user
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionController>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let identifier = non_blank(&form.username)
        .or(non_blank(&form.email))
        .ok_or_else(|| ValidationError::EmptyField("username or email".to_string()))?;

    let outcome = sessions
        .login(identifier, &form.password)
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    let mut response = HttpResponse::Ok();
    for cookie in cookies.token_cookies(
        &outcome.tokens,
        sessions.access_token_expiry(),
        sessions.refresh_token_expiry(),
    ) {
        response.cookie(cookie);
    }

    Ok(response.json(LoginResponse {
        user: outcome.user,
        tokens: TokenResponse::bearer(outcome.tokens, sessions.access_token_expiry()),
    }))
}

/// POST /api/v1/users/refresh-token
///
/// The refresh token comes from the refresh cookie or the JSON body. The
/// presented token is spent: only the returned one works afterwards.
///
/// # Errors
/// - 401: missing, malformed, expired or revoked refresh token
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    sessions: web::Data<SessionController>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let presented = req
        .cookie(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| body.and_then(|body| body.into_inner().refresh_token))
        .filter(|token| !token.trim().is_empty())
        .ok_or(AppError::Auth(AuthError::MissingToken))?;

    let tokens = sessions.refresh(presented.trim()).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    let mut response = HttpResponse::Ok();
    for cookie in cookies.token_cookies(
        &tokens,
        sessions.access_token_expiry(),
        sessions.refresh_token_expiry(),
    ) {
        response.cookie(cookie);
    }

    Ok(response.json(TokenResponse::bearer(tokens, sessions.access_token_expiry())))
}

/// POST /api/v1/users/logout
///
/// **Requires a valid access token.** Clears the stored refresh session and
/// the token cookies.
pub async fn logout(
    claims: web::ReqData<AccessClaims>,
    sessions: web::Data<SessionController>,
    cookies: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    sessions.logout(user_id).await?;

    let mut response = HttpResponse::Ok();
    for cookie in cookies.removal_cookies() {
        response.cookie(cookie);
    }

    Ok(response.json(serde_json::json!({ "message": "User logged out successfully" })))
}
