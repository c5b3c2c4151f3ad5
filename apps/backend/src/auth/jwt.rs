use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::ErrorCode;
use crate::state::security_config::SecurityConfig;
use crate::AppError;

pub const SESSION_AUDIENCE: &str = "clubhouse-session";
pub const CONFIRM_AUDIENCE: &str = "clubhouse-confirm";
pub const CONFIRM_TTL: Duration = Duration::from_secs(5 * 60);

/// Claims of a login session token. Only valid while session `sid` exists.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    /// Member id
    pub sub: String,
    /// Session row id (ULID)
    pub sid: String,
    pub aud: String,
    /// Issued-at (seconds since epoch)
    pub iat: i64,
    /// Expiry (seconds since epoch)
    pub exp: i64,
}

impl SessionClaims {
    pub fn member_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::unauthorized_invalid_token())
    }
}

/// Claims of a short-lived token that authorises one destructive
/// maintenance action for one admin.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConfirmClaims {
    pub sub: String,
    pub action: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

fn epoch_secs(now: SystemTime) -> Result<i64, AppError> {
    Ok(now
        .duration_since(UNIX_EPOCH)
        .map_err(|_| AppError::internal("Failed to get current time".to_string()))?
        .as_secs() as i64)
}

fn sign<T: Serialize>(claims: &T, security: &SecurityConfig) -> Result<String, AppError> {
    encode(
        &Header::new(security.algorithm),
        claims,
        &EncodingKey::from_secret(&security.jwt_secret),
    )
    .map_err(|e| AppError::internal(format!("Failed to encode JWT: {e}")))
}

fn validation(security: &SecurityConfig, audience: &str) -> Validation {
    // Default Validation already checks exp; pin algorithm and audience.
    let mut validation = Validation::new(security.algorithm);
    validation.set_audience(&[audience]);
    validation.leeway = 0;
    validation
}

/// Mint a session token for `session_id`, expiring after the configured TTL.
pub fn mint_session_token(
    member_id: i64,
    session_id: &str,
    now: SystemTime,
    security: &SecurityConfig,
) -> Result<String, AppError> {
    let iat = epoch_secs(now)?;
    let claims = SessionClaims {
        sub: member_id.to_string(),
        sid: session_id.to_string(),
        aud: SESSION_AUDIENCE.to_string(),
        iat,
        exp: iat + security.session_ttl.as_secs() as i64,
    };
    sign(&claims, security)
}

/// Verify signature, audience and expiry of a session token.
pub fn verify_session_token(
    token: &str,
    security: &SecurityConfig,
) -> Result<SessionClaims, AppError> {
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(&security.jwt_secret),
        &validation(security, SESSION_AUDIENCE),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::unauthorized_expired_token(),
        _ => AppError::unauthorized_invalid_token(),
    })
}

pub fn mint_confirmation_token(
    member_id: i64,
    action: &str,
    now: SystemTime,
    security: &SecurityConfig,
) -> Result<String, AppError> {
    let iat = epoch_secs(now)?;
    let claims = ConfirmClaims {
        sub: member_id.to_string(),
        action: action.to_string(),
        aud: CONFIRM_AUDIENCE.to_string(),
        iat,
        exp: iat + CONFIRM_TTL.as_secs() as i64,
    };
    sign(&claims, security)
}

/// The token must be unexpired, signed by us, and bound to both this admin
/// and this action.
pub fn verify_confirmation_token(
    token: &str,
    member_id: i64,
    action: &str,
    security: &SecurityConfig,
) -> Result<ConfirmClaims, AppError> {
    let invalid = |detail: &str| AppError::forbidden(ErrorCode::InvalidConfirmation, detail);

    let claims = decode::<ConfirmClaims>(
        token,
        &DecodingKey::from_secret(&security.jwt_secret),
        &validation(security, CONFIRM_AUDIENCE),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => invalid("Confirmation expired; request a new one"),
        _ => invalid("Confirmation token is not valid"),
    })?;

    if claims.sub != member_id.to_string() || claims.action != action {
        return Err(invalid("Confirmation was issued for a different action"));
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn session_roundtrip() {
        let security = SecurityConfig::for_tests();
        let now = SystemTime::now();

        let token = mint_session_token(42, "01HZX", now, &security).unwrap();
        let claims = verify_session_token(&token, &security).unwrap();

        assert_eq!(claims.member_id().unwrap(), 42);
        assert_eq!(claims.sid, "01HZX");
        assert_eq!(
            claims.iat,
            now.duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
        );
        assert_eq!(claims.exp, claims.iat + 12 * 60 * 60);
    }

    #[test]
    fn expired_session_is_reported_as_expired() {
        let security = SecurityConfig::for_tests();
        let now = SystemTime::now() - Duration::from_secs(13 * 60 * 60);

        let token = mint_session_token(1, "s", now, &security).unwrap();
        let err = verify_session_token(&token, &security).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnauthorizedExpiredToken);
    }

    #[test]
    fn bad_signature_is_invalid() {
        let token = mint_session_token(1, "s", SystemTime::now(), &SecurityConfig::new("secret-A"))
            .unwrap();
        let err = verify_session_token(&token, &SecurityConfig::new("secret-B")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnauthorizedInvalidToken);
    }

    #[test]
    fn confirmation_cannot_be_used_as_session() {
        let security = SecurityConfig::for_tests();
        let token = mint_confirmation_token(1, "restore", SystemTime::now(), &security).unwrap();
        assert!(verify_session_token(&token, &security).is_err());
    }

    #[test]
    fn confirmation_is_bound_to_action_and_admin() {
        let security = SecurityConfig::for_tests();
        let token = mint_confirmation_token(7, "restore", SystemTime::now(), &security).unwrap();

        assert!(verify_confirmation_token(&token, 7, "restore", &security).is_ok());
        for (member, action) in [(7, "migrate"), (8, "restore")] {
            let err = verify_confirmation_token(&token, member, action, &security).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidConfirmation);
        }
    }

    #[test]
    fn stale_confirmation_is_rejected() {
        let security = SecurityConfig::for_tests();
        let issued = SystemTime::now() - Duration::from_secs(6 * 60);
        let token = mint_confirmation_token(7, "restore", issued, &security).unwrap();
        assert!(verify_confirmation_token(&token, 7, "restore", &security).is_err());
    }
}
