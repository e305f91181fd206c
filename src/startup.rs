use actix_files as fs;
use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::configuration::Settings;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    change_password, current_user, health_check, login, logout, refresh, register,
    update_account, update_avatar, update_cover_image, CookieSettings,
};
use crate::session::SessionController;
use crate::store::CredentialStore;

/// Request bodies above this size are rejected
const JSON_PAYLOAD_LIMIT: usize = 16 * 1024;

/// Build and start the HTTP server.
///
/// Fails with `InvalidInput` when the signing settings are unusable; the
/// process is not meant to run with a broken token configuration.
pub fn run(
    listener: TcpListener,
    store: Arc<dyn CredentialStore>,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let controller = SessionController::from_settings(store, &settings).map_err(|e| {
        tracing::error!(error = %e, "Invalid token configuration");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;
    let verifier = controller.verifier().clone();

    let sessions = web::Data::new(controller);
    let cookies = web::Data::new(CookieSettings {
        secure: settings.application.secure_cookies,
    });

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(sessions.clone())
            .app_data(cookies.clone())
            .app_data(web::JsonConfig::default().limit(JSON_PAYLOAD_LIMIT))

            .route("/api/v1/healthcheck", web::get().to(health_check))

            // Public routes; registered ahead of the protected scope so they
            // match first
            .route("/api/v1/users/register", web::post().to(register))
            .route("/api/v1/users/login", web::post().to(login))
            .route("/api/v1/users/refresh-token", web::post().to(refresh))

            // Protected routes (require an access token)
            .service(
                web::scope("/api/v1/users")
                    .wrap(JwtMiddleware::new(verifier.clone()))
                    .route("/logout", web::post().to(logout))
                    .route("/change-password", web::post().to(change_password))
                    .route("/current-user", web::get().to(current_user))
                    .route("/update-account", web::patch().to(update_account))
                    .route("/avatar", web::patch().to(update_avatar))
                    .route("/cover-image", web::patch().to(update_cover_image)),
            )

            // Static file serving (must be last to not override API routes)
            .service(fs::Files::new("/", "./public").index_file("index.html"))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
