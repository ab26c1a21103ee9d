//! Session cookie construction

use axum_extra::extract::cookie::{Cookie, SameSite};
use secure_auth_core::TokenConfig;

/// Cookie carrying a freshly issued token
///
/// `HttpOnly`, path `/`, `SameSite=Lax`. `Secure` is set only when
/// `secure` is true (production), and the lifetime matches the token's.
pub fn create_session_cookie(config: &TokenConfig, token: String, secure: bool) -> Cookie<'static> {
    let max_age = i64::try_from(config.expiration_secs).unwrap_or(i64::MAX);

    Cookie::build((config.cookie_name.clone(), token))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(max_age))
        .build()
}

/// Expired, empty cookie that clears the session cookie on the client
pub fn create_logout_cookie(config: &TokenConfig, secure: bool) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), ""))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let config = TokenConfig::default();
        let cookie = create_session_cookie(&config, "abc.def.ghi".to_string(), false);

        assert_eq!(cookie.name(), "session_token");
        assert_eq!(cookie.value(), "abc.def.ghi");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(
            cookie.max_age(),
            Some(time::Duration::seconds(config.expiration_secs as i64))
        );
    }

    #[test]
    fn test_secure_flag_in_production() {
        let cookie = create_session_cookie(&TokenConfig::default(), "t".to_string(), true);
        assert_eq!(cookie.secure(), Some(true));
        assert!(cookie.to_string().contains("Secure"));
    }

    #[test]
    fn test_logout_cookie_expires_immediately() {
        let cookie = create_logout_cookie(&TokenConfig::default(), false);

        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
        assert!(cookie.to_string().contains("Max-Age=0"));
    }
}
