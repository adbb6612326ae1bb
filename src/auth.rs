//! `mysql_native_password` scrambling.
//!
//! ```text
//! SHA1(password) XOR SHA1(salt + SHA1(SHA1(password)))
//! ```
use rand::{Rng, distributions::Alphanumeric};
use sha1::{Digest, Sha1};

pub const SALT_LEN: usize = 20;

/// Computes the client's auth response for `salt`. Empty passwords send nothing.
pub fn scramble_password(salt: &[u8], password: &str) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let salt = &salt[..salt.len().min(SALT_LEN)];

    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();

    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(stage2);
    let mask: [u8; 20] = hasher.finalize().into();

    stage1.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}

/// Checks a client's auth response against the expected password.
pub fn verify_password(salt: &[u8], password: &str, response: &[u8]) -> bool {
    scramble_password(salt, password) == response
}

/// Random printable salt; NUL bytes would truncate the greeting's second part.
pub fn generate_salt() -> Vec<u8> {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_password_sends_nothing() {
        assert!(scramble_password(b"01234567890123456789", "").is_empty());
    }

    #[test]
    fn scramble_is_salted() {
        let a = scramble_password(b"aaaaaaaaaaaaaaaaaaaa", "secret");
        let b = scramble_password(b"bbbbbbbbbbbbbbbbbbbb", "secret");
        assert_eq!(a.len(), 20);
        assert_ne!(a, b);
        assert!(verify_password(b"aaaaaaaaaaaaaaaaaaaa", "secret", &a));
        assert!(!verify_password(b"aaaaaaaaaaaaaaaaaaaa", "other", &a));
    }

    #[test]
    fn salt_has_no_nul() {
        let salt = generate_salt();
        assert_eq!(salt.len(), SALT_LEN);
        assert!(!salt.contains(&0));
    }
}
