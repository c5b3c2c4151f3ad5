use actix_web::{dev::Payload, http::header, FromRequest, HttpRequest};
use serde::{Deserialize, Serialize};

use crate::AppError;

/// Cookie set by login for browser clients.
pub const SESSION_COOKIE: &str = "session_token";

/// Session token taken from `Authorization: Bearer ...` or, failing that,
/// from the session cookie.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthToken {
    pub token: String,
}

fn bearer(req: &HttpRequest) -> Result<Option<String>, AppError> {
    let Some(auth_header) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::unauthorized_invalid_token())?;

    // Parse "Bearer <token>" format
    let parts: Vec<&str> = auth_value.split_whitespace().collect();
    if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("Bearer") || parts[1].is_empty() {
        return Err(AppError::unauthorized_invalid_token());
    }
    Ok(Some(parts[1].to_string()))
}

impl AuthToken {
    pub fn from_http(req: &HttpRequest) -> Result<Self, AppError> {
        if let Some(token) = bearer(req)? {
            return Ok(AuthToken { token });
        }
        req.cookie(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
            .map(|token| AuthToken { token })
            .ok_or_else(AppError::unauthorized_missing_token)
    }
}

impl FromRequest for AuthToken {
    type Error = AppError;
    type Future = std::future::Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        std::future::ready(AuthToken::from_http(req))
    }
}

#[cfg(test)]
mod tests {
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    use super::*;
    use crate::errors::ErrorCode;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc"))
            .cookie(Cookie::new(SESSION_COOKIE, "from-cookie"))
            .to_http_request();
        assert_eq!(AuthToken::from_http(&req).unwrap().token, "abc");
    }

    #[test]
    fn cookie_is_used_without_header() {
        let req = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, "from-cookie"))
            .to_http_request();
        assert_eq!(AuthToken::from_http(&req).unwrap().token, "from-cookie");
    }

    #[test]
    fn missing_and_malformed() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(
            AuthToken::from_http(&req).unwrap_err().code(),
            ErrorCode::UnauthorizedMissingToken
        );

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic dXNlcjpwdw=="))
            .to_http_request();
        assert_eq!(
            AuthToken::from_http(&req).unwrap_err().code(),
            ErrorCode::UnauthorizedInvalidToken
        );
    }
}
