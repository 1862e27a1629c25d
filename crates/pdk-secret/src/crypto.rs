//! AES-256-GCM + PBKDF2-SHA256 envelope encryption, adapted from
//! `shipper-encrypt`'s state-file encryption: same constants, same
//! derive-then-seal shape, restructured so a single PBKDF2-derived master
//! key is reused across every secret record (SPEC_FULL.md §6 stores one
//! `iv` per record, not a salt per record).

use aes_gcm::aead::{Aead, KeyInit, OsRng, rand_core::RngCore};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use pbkdf2::pbkdf2_hmac_array;
use sha2::Sha256;

use crate::error::SecretError;

pub const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const PBKDF2_ITERATIONS: u32 = 100_000;
const KEY_SIZE: usize = 32;

pub type MasterKey = [u8; KEY_SIZE];

/// Derive the store's master key from machine-scoped key material and a
/// salt persisted alongside it. Called once per store open, not per secret.
pub fn derive_master_key(key_material: &[u8], salt: &[u8; SALT_SIZE]) -> MasterKey {
    pbkdf2_hmac_array::<Sha256, KEY_SIZE>(key_material, salt, PBKDF2_ITERATIONS)
}

pub fn random_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Seal `plaintext` under the store's master key, returning `(iv, ciphertext)`
/// each base64-encoded, matching the on-disk secret record schema.
pub fn seal(plaintext: &[u8], key: &MasterKey) -> Result<(String, String), SecretError> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SecretError::Crypto(format!("failed to init cipher: {e}")))?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| SecretError::Crypto(format!("encryption failed: {e:?}")))?;

    Ok((BASE64.encode(nonce_bytes), BASE64.encode(ciphertext)))
}

/// Open a `(iv, ciphertext)` pair produced by [`seal`].
pub fn open(iv: &str, ciphertext: &str, key: &MasterKey) -> Result<Vec<u8>, SecretError> {
    let nonce_bytes = BASE64
        .decode(iv)
        .map_err(|e| SecretError::Corrupt(format!("invalid iv: {e}")))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(SecretError::Corrupt("iv has wrong length".to_string()));
    }
    let ciphertext = BASE64
        .decode(ciphertext)
        .map_err(|e| SecretError::Corrupt(format!("invalid ciphertext: {e}")))?;

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SecretError::Crypto(format!("failed to init cipher: {e}")))?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext.as_slice())
        .map_err(|_| SecretError::Crypto("decryption failed - wrong key or corrupted data".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let salt = random_salt();
        let key = derive_master_key(b"machine-scoped-key-material", &salt);
        let (iv, ciphertext) = seal(b"super secret value", &key).unwrap();
        let plaintext = open(&iv, &ciphertext, &key).unwrap();
        assert_eq!(plaintext, b"super secret value");
    }

    #[test]
    fn distinct_seals_produce_distinct_ivs() {
        let salt = random_salt();
        let key = derive_master_key(b"machine-scoped-key-material", &salt);
        let (iv_a, _) = seal(b"same value", &key).unwrap();
        let (iv_b, _) = seal(b"same value", &key).unwrap();
        assert_ne!(iv_a, iv_b);
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let salt_a = random_salt();
        let key_a = derive_master_key(b"key-a", &salt_a);
        let (iv, ciphertext) = seal(b"secret", &key_a).unwrap();

        let salt_b = random_salt();
        let key_b = derive_master_key(b"key-b", &salt_b);
        assert!(open(&iv, &ciphertext, &key_b).is_err());
    }

    #[test]
    fn same_material_and_salt_derive_same_key() {
        let salt = random_salt();
        let key_a = derive_master_key(b"material", &salt);
        let key_b = derive_master_key(b"material", &salt);
        assert_eq!(key_a, key_b);
    }
}
