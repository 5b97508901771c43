use crate::error::{AppError, AppResult};

pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

pub fn hash_password(plaintext: &str, cost: u32) -> AppResult<String> {
    bcrypt::hash(plaintext, cost).map_err(|e| AppError::Internal(format!("bcrypt: {e}")))
}

/// Constant-time check via bcrypt; a malformed hash simply fails to match.
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse", 4).unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn same_password_gets_different_salts() {
        let a = hash_password("password1", 4).unwrap();
        let b = hash_password("password1", 4).unwrap();
        assert_ne!(a, b);
        assert!(verify_password("password1", &a));
        assert!(verify_password("password1", &b));
    }

    #[test]
    fn invalid_cost_is_an_error() {
        assert!(hash_password("pw", 1).is_err());
    }

    #[test]
    fn malformed_hash_never_matches() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
