use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Turns a plaintext password into a storable hash.
pub trait HashPassword: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, String>;
}

/// Argon2id with the crate's default parameters; output is a PHC string.
#[derive(Debug, Default, Clone)]
pub struct Argon2Hasher;

impl Argon2Hasher {
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

impl HashPassword for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| format!("failed to hash password: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_salted_and_verifiable() {
        let hasher = Argon2Hasher;
        let a = hasher.hash("sevenchr").unwrap();
        let b = hasher.hash("sevenchr").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(hasher.verify("sevenchr", &a));
        assert!(!hasher.verify("eightchr", &a));
        assert!(!hasher.verify("sevenchr", "garbage"));
    }
}
