//! Secrets handling: envelope encryption for tenant credentials, password
//! hashing and opaque token generation.
//!
//! Encrypted values use the format MAGIC (4 bytes) || nonce (12 bytes) || ciphertext,
//! with a per-tenant data encryption key derived from the master key via HKDF.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng as PasswordRng},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

const NONCE_SIZE: usize = 12;

const MASTER_KEY_SIZE: usize = 32;

const ENCRYPTED_MAGIC: &[u8] = b"ENC1";

const SESSION_TOKEN_PREFIX: &str = "mcs_";

/// Master key for envelope encryption of tenant secrets (SMTP passwords).
#[derive(Clone)]
pub struct MasterKey {
    key: [u8; MASTER_KEY_SIZE],
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

impl MasterKey {
    /// Create a MasterKey from a base64-encoded string.
    /// The decoded key must be exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::Internal(format!("Invalid master key encoding: {}", e)))?;

        if decoded.len() != MASTER_KEY_SIZE {
            return Err(AppError::Internal(format!(
                "Master key must be {} bytes, got {}",
                MASTER_KEY_SIZE,
                decoded.len()
            )));
        }

        let mut key = [0u8; MASTER_KEY_SIZE];
        key.copy_from_slice(&decoded);
        Ok(Self { key })
    }

    /// Generate a new random master key, base64-encoded.
    pub fn generate() -> String {
        let mut key = [0u8; MASTER_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Random in-process key for dev mode.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; MASTER_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    fn derive_dek(&self, user_id: i64) -> Result<[u8; 32]> {
        let hk = Hkdf::<Sha256>::new(Some(b"meus-clientes-v1"), &self.key);
        let mut dek = [0u8; 32];
        hk.expand(format!("user:{}", user_id).as_bytes(), &mut dek)
            .map_err(|e| AppError::Internal(format!("Key derivation failed: {}", e)))?;
        Ok(dek)
    }

    /// Encrypt a tenant secret. Returns MAGIC || nonce || ciphertext.
    pub fn encrypt(&self, user_id: i64, plaintext: &[u8]) -> Result<Vec<u8>> {
        let dek = self.derive_dek(user_id)?;
        let cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| AppError::Internal(format!("Failed to create cipher: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| AppError::Internal(format!("Encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(ENCRYPTED_MAGIC.len() + NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(ENCRYPTED_MAGIC);
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    pub fn decrypt(&self, user_id: i64, encrypted: &[u8]) -> Result<Vec<u8>> {
        if !Self::is_encrypted(encrypted) {
            return Err(AppError::Internal(
                "Invalid encrypted data format (missing magic bytes)".into(),
            ));
        }

        let dek = self.derive_dek(user_id)?;
        let cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| AppError::Internal(format!("Failed to create cipher: {}", e)))?;

        let nonce_start = ENCRYPTED_MAGIC.len();
        let nonce_end = nonce_start + NONCE_SIZE;
        let nonce = Nonce::from_slice(&encrypted[nonce_start..nonce_end]);

        cipher
            .decrypt(nonce, &encrypted[nonce_end..])
            .map_err(|e| AppError::Internal(format!("Decryption failed: {}", e)))
    }

    /// Decrypt to a UTF-8 string.
    pub fn decrypt_string(&self, user_id: i64, encrypted: &[u8]) -> Result<String> {
        let bytes = self.decrypt(user_id, encrypted)?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("Decrypted secret is not UTF-8: {}", e)))
    }

    pub fn is_encrypted(data: &[u8]) -> bool {
        data.len() > ENCRYPTED_MAGIC.len() + NONCE_SIZE && data.starts_with(ENCRYPTED_MAGIC)
    }
}

/// Hash a secret for database lookups (session tokens).
/// SHA-256 with application salt, lowercase hex.
pub fn hash_secret(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"meus-clientes-v1:");
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// `n` random bytes as lowercase hex.
pub fn random_hex(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// New opaque bearer token. Only its hash is stored.
pub fn generate_session_token() -> String {
    format!("{}{}", SESSION_TOKEN_PREFIX, random_hex(32))
}

/// Temporary password for the forgot-password flow: 10 chars, no ambiguous glyphs.
pub fn generate_temporary_password() -> String {
    const ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyzABCDEFGHJKMNPQRSTUVWXYZ23456789";
    let mut bytes = [0u8; 10];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| ALPHABET[*b as usize % ALPHABET.len()] as char)
        .collect()
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut PasswordRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Unparseable hashes count as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
