//! Unique test data, so tests sharing a database never collide.

use ulid::Ulid;

/// `{prefix}-{ulid}`
pub fn unique_str(prefix: &str) -> String {
    format!("{}-{}", prefix, Ulid::new())
}

/// A lowercase name that passes username normalization unchanged.
pub fn unique_username(prefix: &str) -> String {
    unique_str(prefix).to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_unique_and_prefixed() {
        let a = unique_username("member");
        let b = unique_username("member");
        assert_ne!(a, b);
        assert!(a.starts_with("member-"));
        assert_eq!(a, a.to_ascii_lowercase());
    }
}
