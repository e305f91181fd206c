/// Token cookies
///
/// Browsers get both tokens as `HttpOnly` cookies; other clients use the
/// JSON body. Cookie names match what existing web clients send.

use actix_web::cookie::{time::Duration, Cookie, SameSite};

use crate::auth::TokenPair;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    pub secure: bool,
}

impl CookieSettings {
    fn token_cookie(&self, name: &'static str, value: String, max_age: i64) -> Cookie<'static> {
        Cookie::build(name, value)
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(Duration::seconds(max_age))
            .finish()
    }

    /// Cookies carrying a freshly issued pair
    pub fn token_cookies(
        &self,
        tokens: &TokenPair,
        access_max_age: i64,
        refresh_max_age: i64,
    ) -> [Cookie<'static>; 2] {
        [
            self.token_cookie(ACCESS_TOKEN_COOKIE, tokens.access_token.clone(), access_max_age),
            self.token_cookie(REFRESH_TOKEN_COOKIE, tokens.refresh_token.clone(), refresh_max_age),
        ]
    }

    /// Cookies telling the browser to drop both tokens
    pub fn removal_cookies(&self) -> [Cookie<'static>; 2] {
        [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE].map(|name| {
            let mut cookie = Cookie::build(name, "")
                .path("/")
                .http_only(true)
                .secure(self.secure)
                .finish();
            cookie.make_removal();
            cookie
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cookies_are_http_only() {
        let tokens = TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        };
        let [access, refresh] = CookieSettings { secure: true }.token_cookies(&tokens, 900, 3600);

        assert_eq!(access.name(), ACCESS_TOKEN_COOKIE);
        assert_eq!(access.value(), "a");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));
        assert_eq!(refresh.max_age(), Some(Duration::seconds(3600)));
    }

    #[test]
    fn test_removal_cookies_are_empty() {
        for cookie in (CookieSettings { secure: false }).removal_cookies() {
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        }
    }
}
