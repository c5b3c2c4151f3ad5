use std::time::Duration;

use jsonwebtoken::Algorithm;

/// Session and credential settings
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Secret used to sign session and confirmation tokens
    pub jwt_secret: Vec<u8>,
    /// JWT algorithm to use (defaults to HS256)
    pub algorithm: Algorithm,
    /// bcrypt work factor for new password hashes
    pub bcrypt_cost: u32,
    /// Lifetime of a login session
    pub session_ttl: Duration,
}

impl SecurityConfig {
    pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

    /// Create a new SecurityConfig with the given signing secret
    pub fn new(jwt_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            algorithm: Algorithm::HS256,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            session_ttl: Self::DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Fast hashing and a fixed secret, for tests only.
    pub fn for_tests() -> Self {
        Self::new(b"clubhouse_test_secret_not_for_production".to_vec()).with_bcrypt_cost(4)
    }
}
