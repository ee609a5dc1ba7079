use crate::error::{AppError, AppResult};

pub fn hash(plaintext: &str, cost: u32) -> AppResult<String> {
    bcrypt::hash(plaintext, cost).map_err(|e| AppError::Internal(format!("bcrypt: {}", e)))
}

/// Constant-time check via bcrypt. A malformed stored hash never verifies.
pub fn verify(plaintext: &str, hashed: &str) -> bool {
    bcrypt::verify(plaintext, hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hashed = hash("hunter2", 4).unwrap();
        assert_ne!(hashed, "hunter2");
        assert!(verify("hunter2", &hashed));
        assert!(!verify("hunter3", &hashed));
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = hash("pw", 4).unwrap();
        let b = hash("pw", 4).unwrap();
        assert_ne!(a, b);
        assert!(verify("pw", &a) && verify("pw", &b));
    }

    #[test]
    fn garbage_hash_does_not_verify() {
        assert!(!verify("pw", "not-a-bcrypt-hash"));
    }
}
