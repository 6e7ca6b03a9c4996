//! scrypt password hashing in the `<salt>:<derived>` hex format.
use rand::RngCore;
use scrypt::{scrypt, Params};
use thiserror::Error;

/// Salt bytes before hex encoding (32 hex chars).
pub const SALT_LEN: usize = 16;
/// Derived key bytes before hex encoding (128 hex chars).
pub const KEY_LEN: usize = 64;

// N = 2^14, r = 8, p = 1.
const LOG_N: u8 = 14;
const R: u32 = 8;
const P: u32 = 1;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("password must be a non-empty string")]
    EmptyPassword,
    #[error("stored hash is malformed")]
    Malformed,
    #[error("scrypt failure: {0}")]
    Scrypt(String),
}

fn derive(password: &str, salt: &str) -> Result<[u8; KEY_LEN], HashError> {
    let params =
        Params::new(LOG_N, R, P, KEY_LEN).map_err(|e| HashError::Scrypt(e.to_string()))?;
    let mut out = [0u8; KEY_LEN];
    scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut out)
        .map_err(|e| HashError::Scrypt(e.to_string()))?;
    Ok(out)
}

/// Hash with a fresh random salt. The hex salt string itself is the scrypt salt.
pub fn hash_password(password: &str) -> Result<String, HashError> {
    if password.is_empty() {
        return Err(HashError::EmptyPassword);
    }
    let mut salt_bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = hex::encode(salt_bytes);
    let derived = derive(password, &salt)?;
    Ok(format!("{}:{}", salt, hex::encode(derived)))
}

pub fn verify_password(password: &str, stored: &str) -> Result<bool, HashError> {
    let (salt, expected) = stored.split_once(':').ok_or(HashError::Malformed)?;
    if salt.len() != SALT_LEN * 2 || expected.len() != KEY_LEN * 2 {
        return Err(HashError::Malformed);
    }
    let expected = hex::decode(expected).map_err(|_| HashError::Malformed)?;
    let derived = derive(password, salt)?;
    // constant-time compare
    let diff = derived
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    Ok(diff == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_has_salt_and_key() {
        let h = hash_password("hunter2").unwrap();
        let (salt, key) = h.split_once(':').unwrap();
        assert_eq!(salt.len(), 32);
        assert_eq!(key.len(), 128);
        assert!(h.chars().filter(|c| *c != ':').all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn verify_roundtrip() {
        let h = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &h).unwrap());
        assert!(!verify_password("wrong horse", &h).unwrap());
    }

    #[test]
    fn empty_and_malformed() {
        assert!(matches!(hash_password(""), Err(HashError::EmptyPassword)));
        assert!(matches!(verify_password("x", "nocolon"), Err(HashError::Malformed)));
        assert!(matches!(verify_password("x", "ab:cd"), Err(HashError::Malformed)));
    }
}
