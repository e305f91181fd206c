/// Password Hashing and Verification
///
/// bcrypt with a configurable work factor. The salt is random per call and
/// embedded in the digest, so the digest is the only thing ever stored.

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 6;
/// bcrypt ignores everything past this many bytes
const MAX_PASSWORD_BYTES: usize = 72;

/// One-way credential transform
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a plaintext password
    ///
    /// # Errors
    /// Returns error if bcrypt rejects the cost or input
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        bcrypt::hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Check a plaintext password against a stored digest.
    ///
    /// A mismatch is `false`, never an error. A digest bcrypt cannot parse is
    /// also `false`.
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        match bcrypt::verify(password, digest) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::error!(error = %e, "Stored password digest could not be parsed");
                false
            }
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

/// Validate password strength requirements
///
/// Requirements:
/// - At least 6 characters and at most 72 bytes
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    // Longer inputs would collide with any password sharing their prefix
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::Validation(ValidationError::InvalidFormat(format!(
            "password must be at most {} bytes",
            MAX_PASSWORD_BYTES
        ))));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(4)
    }

    #[test]
    fn test_hash_password() {
        let password = "Secr3t!";
        let hash = hasher().hash(password).expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_verify_password() {
        let hash = hasher().hash("Secr3t!").expect("Failed to hash password");
        assert!(hasher().verify("Secr3t!", &hash));
    }

    #[test]
    fn test_verify_wrong_password() {
        let hash = hasher().hash("Secr3t!").expect("Failed to hash password");
        assert!(!hasher().verify("Secr3t?", &hash));
        assert!(!hasher().verify("", &hash));
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let first = hasher().hash("Secr3t!").unwrap();
        let second = hasher().hash("Secr3t!").unwrap();

        assert_ne!(first, second);
        assert!(hasher().verify("Secr3t!", &first));
        assert!(hasher().verify("Secr3t!", &second));
    }

    #[test]
    fn test_malformed_digest_is_a_mismatch() {
        assert!(!hasher().verify("Secr3t!", "not-a-bcrypt-digest"));
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Secr3t!").is_ok());
        assert!(validate_password_strength("Sh0rt").is_err());
        assert!(validate_password_strength("NoDigitsHere").is_err());
        assert!(validate_password_strength("NOLOWER1").is_err());
        assert!(validate_password_strength("noupper1").is_err());
    }

    #[test]
    fn test_password_byte_limit() {
        let at_limit = format!("A1{}", "a".repeat(MAX_PASSWORD_BYTES - 2));
        assert!(validate_password_strength(&at_limit).is_ok());

        let over_limit = format!("{}b", at_limit);
        assert!(validate_password_strength(&over_limit).is_err());

        // Multibyte characters count by their encoded size
        let wide = format!("A1{}", "é".repeat(36));
        assert!(wide.chars().count() < MAX_PASSWORD_BYTES);
        assert!(validate_password_strength(&wide).is_err());
    }

    #[test]
    fn test_accepted_passwords_sharing_a_long_prefix_do_not_collide() {
        let prefix = format!("A1{}", "a".repeat(MAX_PASSWORD_BYTES - 3));
        let p = format!("{}X", prefix);
        let q = format!("{}Y", prefix);
        assert!(validate_password_strength(&p).is_ok());
        assert!(validate_password_strength(&q).is_ok());

        let digest = hasher().hash(&q).unwrap();
        assert!(!hasher().verify(&p, &digest));
        assert!(hasher().verify(&q, &digest));
    }
}
