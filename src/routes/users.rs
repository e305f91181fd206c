/// Account routes for the authenticated user.
/// All of them sit behind the access token middleware.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::AccessClaims;
use crate::error::{AppError, ErrorContext};
use crate::session::SessionController;

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct UpdateAccountRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct AvatarRequest {
    pub avatar: String,
}

#[derive(Deserialize)]
pub struct CoverImageRequest {
    pub cover_image: String,
}

/// GET /api/v1/users/current-user
pub async fn current_user(
    claims: web::ReqData<AccessClaims>,
    sessions: web::Data<SessionController>,
) -> Result<HttpResponse, AppError> {
    let user = sessions.current_user(claims.user_id()?).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// POST /api/v1/users/change-password
///
/// # Errors
/// - 400: new password too weak
/// - 401: old password wrong (nothing is changed)
pub async fn change_password(
    claims: web::ReqData<AccessClaims>,
    form: web::Json<ChangePasswordRequest>,
    sessions: web::Data<SessionController>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let context = ErrorContext::new("change_password").with_user_id(user_id.to_string());

    sessions
        .change_password(user_id, &form.old_password, &form.new_password)
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Password was updated successfully" })))
}

/// PATCH /api/v1/users/update-account
pub async fn update_account(
    claims: web::ReqData<AccessClaims>,
    form: web::Json<UpdateAccountRequest>,
    sessions: web::Data<SessionController>,
) -> Result<HttpResponse, AppError> {
    let user = sessions
        .update_account_details(
            claims.user_id()?,
            form.full_name.as_deref(),
            form.email.as_deref(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(user))
}

/// PATCH /api/v1/users/avatar
pub async fn update_avatar(
    claims: web::ReqData<AccessClaims>,
    form: web::Json<AvatarRequest>,
    sessions: web::Data<SessionController>,
) -> Result<HttpResponse, AppError> {
    let user = sessions.update_avatar(claims.user_id()?, &form.avatar).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// PATCH /api/v1/users/cover-image
pub async fn update_cover_image(
    claims: web::ReqData<AccessClaims>,
    form: web::Json<CoverImageRequest>,
    sessions: web::Data<SessionController>,
) -> Result<HttpResponse, AppError> {
    let user = sessions
        .update_cover_image(claims.user_id()?, &form.cover_image)
        .await?;
    Ok(HttpResponse::Ok().json(user))
}
