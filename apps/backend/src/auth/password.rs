//! Credential hashing and input rules for usernames and passwords.

use unicode_normalization::UnicodeNormalization;

use crate::errors::domain::{DomainError, InfraErrorKind, ValidationKind};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_USERNAME_LEN: usize = 64;

/// NFKC-normalise, trim and lowercase so visually identical names collide.
pub fn normalize_username(raw: &str) -> Result<String, DomainError> {
    let name: String = raw.nfkc().collect::<String>().trim().to_lowercase();

    if name.is_empty() {
        return Err(DomainError::validation(
            ValidationKind::Username,
            "Username must not be empty",
        ));
    }
    if name.chars().count() > MAX_USERNAME_LEN {
        return Err(DomainError::validation(
            ValidationKind::Username,
            format!("Username must be at most {MAX_USERNAME_LEN} characters"),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(DomainError::validation(
            ValidationKind::Username,
            "Username may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    Ok(name)
}

pub fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(
            ValidationKind::Password,
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

/// bcrypt runs on the blocking pool; it is deliberately slow.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, DomainError> {
    let password = password.to_string();
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| DomainError::infra(InfraErrorKind::Other("hash".into()), e.to_string()))?
        .map_err(|e| DomainError::infra(InfraErrorKind::Other("hash".into()), e.to_string()))?;
    Ok(hashed)
}

/// A malformed stored hash counts as a mismatch.
pub async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_normalized() {
        assert_eq!(normalize_username("  Ana.Silva ").unwrap(), "ana.silva");
        // fullwidth letters fold to ASCII under NFKC
        assert_eq!(normalize_username("ＡＮＡ").unwrap(), "ana");
        assert!(normalize_username("   ").is_err());
        assert!(normalize_username("ana silva").is_err());
        assert!(normalize_username(&"a".repeat(65)).is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }

    #[tokio::test]
    async fn hash_and_verify() {
        let hash = hash_password("correct horse", 4).await.unwrap();
        assert!(!hash.is_empty());
        assert!(verify_password("correct horse", &hash).await);
        assert!(!verify_password("wrong horse", &hash).await);
        assert!(!verify_password("correct horse", "not-a-hash").await);
    }
}
