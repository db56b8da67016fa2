use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};

use crate::error::{AuthError, Result};

const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` with AES-256-GCM, prepending the random nonce to the
/// ciphertext so decryption needs nothing but the key.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| AuthError::Encryption(e.to_string()))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn decrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_LEN {
        return Err(AuthError::Encryption("ciphertext too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| AuthError::Encryption(e.to_string()))
}

/// Derive a 32-byte key from an operator-supplied string (env var value).
/// Accepts either exactly 32 raw bytes or any other string, which is padded
/// or truncated deterministically.
pub fn key_from_str(raw: &str) -> [u8; 32] {
    let bytes = raw.as_bytes();
    let mut key = [0u8; 32];
    for (i, b) in bytes.iter().take(32).enumerate() {
        key[i] = *b;
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = key_from_str("0123456789abcdef0123456789abcdef");
        let plaintext = b"my-access-token";
        let ciphertext = encrypt(&key, plaintext).unwrap();
        assert_ne!(ciphertext, plaintext);
        let decrypted = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_rejects_truncated_input() {
        let key = key_from_str("k");
        assert!(decrypt(&key, &[1, 2, 3]).is_err());
    }

    #[test]
    fn different_keys_fail_to_decrypt() {
        let key_a = key_from_str("key-a-key-a-key-a-key-a-key-a-aa");
        let key_b = key_from_str("key-b-key-b-key-b-key-b-key-b-bb");
        let ciphertext = encrypt(&key_a, b"secret").unwrap();
        assert!(decrypt(&key_b, &ciphertext).is_err());
    }
}
