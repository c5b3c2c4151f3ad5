//! Passwords, session tokens and maintenance confirmations.

pub mod jwt;
pub mod password;

pub use jwt::{
    mint_confirmation_token, mint_session_token, verify_confirmation_token, verify_session_token,
    ConfirmClaims, SessionClaims, CONFIRM_TTL,
};
pub use password::{hash_password, normalize_username, validate_password, verify_password};
