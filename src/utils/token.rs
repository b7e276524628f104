// specdriven-service/src/utils/token.rs
//
// Invitation token handling. A token is minted once, mailed to the invitee,
// and never stored: the service keeps only a salted SHA-256 hash, so a leaked
// storage directory does not hand out working invitation links.
use crate::models::ServiceError;
use log::error;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

// 32 random bytes gives 256 bits of entropy; guessing a live token is not a
// realistic attack.
const TOKEN_BYTES: usize = 32;
const SALT_BYTES: usize = 16;

// A freshly minted token. `raw` goes into the notification payload and is
// then dropped; `salt` and `hash` are what gets persisted.
pub struct IssuedToken {
    pub raw: String,
    pub salt: String,
    pub hash: String,
}

pub fn issue() -> IssuedToken {
    let mut rng = OsRng;

    let mut token_bytes = [0u8; TOKEN_BYTES];
    rng.fill_bytes(&mut token_bytes);
    let raw = hex::encode(token_bytes);

    let mut salt_bytes = [0u8; SALT_BYTES];
    rng.fill_bytes(&mut salt_bytes);
    let salt = hex::encode(salt_bytes);

    let hash = hash_with_salt_bytes(&salt_bytes, &raw);

    IssuedToken { raw, salt, hash }
}

// SHA-256 over salt bytes followed by the raw token text.
fn hash_with_salt_bytes(salt: &[u8], raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(raw_token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn salted_hash(salt: &str, raw_token: &str) -> Result<String, ServiceError> {
    let salt_bytes = hex::decode(salt).map_err(|e| {
        error!("Stored token salt is not valid hex: {:?}", e);
        ServiceError::InternalServerError
    })?;
    Ok(hash_with_salt_bytes(&salt_bytes, raw_token))
}

// Recompute the salted hash for a presented token and compare it against the
// stored one in constant time.
pub fn verify(raw_token: &str, salt: &str, stored_hash: &str) -> Result<bool, ServiceError> {
    let candidate = salted_hash(salt, raw_token)?;
    Ok(bool::from(candidate.as_bytes().ct_eq(stored_hash.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_against_its_own_hash() {
        let issued = issue();
        assert!(verify(&issued.raw, &issued.salt, &issued.hash).unwrap());
    }

    #[test]
    fn wrong_token_is_rejected() {
        let issued = issue();
        assert!(!verify("deadbeef", &issued.salt, &issued.hash).unwrap());
    }

    #[test]
    fn tokens_do_not_validate_across_invitations() {
        let a = issue();
        let b = issue();
        assert_ne!(a.raw, b.raw);
        assert!(!verify(&a.raw, &b.salt, &b.hash).unwrap());
        assert!(!verify(&b.raw, &a.salt, &a.hash).unwrap());
    }

    #[test]
    fn stored_hash_never_equals_the_raw_token() {
        let issued = issue();
        assert_ne!(issued.raw, issued.hash);
        assert_eq!(issued.raw.len(), 64);
        assert_eq!(issued.salt.len(), 32);
        assert_eq!(issued.hash.len(), 64);
    }

    #[test]
    fn same_token_with_different_salts_hashes_differently() {
        let a = issue();
        let rehashed = salted_hash(&"ab".repeat(16), &a.raw).unwrap();
        assert_ne!(rehashed, a.hash);
    }

    #[test]
    fn corrupt_salt_is_an_internal_error() {
        assert!(salted_hash("not-hex", "token").is_err());
    }
}
