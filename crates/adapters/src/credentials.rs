//! Credential Store (spec §4.1, C1): symmetric-encrypted device password
//! read/write, with an owner-only key file.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use netorch_core::CryptoError;
use rand::RngCore;
use std::io;
use std::path::Path;
use zeroize::Zeroizing;

/// Ciphertexts are self-describing via this prefix, so re-encrypting an
/// already-encrypted value (or migrating legacy plaintext) is idempotent
/// to detect (spec §4.1).
const CIPHERTEXT_PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// AES-256-GCM credential encryption backed by a key file with
/// owner-only permissions (spec §4.1).
pub struct CredentialStore {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl CredentialStore {
    /// Load the key from `path`, generating and persisting a new one if
    /// absent. Never falls back to plaintext when the key is missing or
    /// unreadable.
    pub fn open(path: &Path) -> Result<Self, CryptoError> {
        let key = load_or_generate_key(path).map_err(|e| CryptoError(e.to_string()))?;
        enforce_owner_only_permissions(path).map_err(|e| CryptoError(e.to_string()))?;
        Ok(Self { key })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn with_key(key: [u8; KEY_LEN]) -> Self {
        Self { key: Zeroizing::new(key) }
    }

    pub fn is_encrypted(s: &str) -> bool {
        s.starts_with(CIPHERTEXT_PREFIX)
    }

    /// Encrypt `plaintext`. Idempotent: re-encrypting an already
    /// ciphertext-prefixed string is a caller error, not performed here —
    /// callers check `is_encrypted` first.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&*self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError("encryption failed".to_string()))?;
        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{CIPHERTEXT_PREFIX}{}", base64::engine::general_purpose::STANDARD.encode(payload)))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt). Fails with
    /// `CryptoError` on tamper or wrong key — callers must treat the
    /// device as unusable, never fall through to plaintext (spec §4.1).
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let encoded = ciphertext
            .strip_prefix(CIPHERTEXT_PREFIX)
            .ok_or_else(|| CryptoError("not a recognised ciphertext".to_string()))?;
        let payload = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError(format!("invalid ciphertext encoding: {e}")))?;
        if payload.len() < NONCE_LEN {
            return Err(CryptoError("ciphertext too short".to_string()));
        }
        let (nonce_bytes, body) = payload.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&*self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|_| CryptoError("decryption failed: tamper or wrong key".to_string()))?;
        String::from_utf8(plaintext).map_err(|e| CryptoError(format!("decrypted payload not utf-8: {e}")))
    }
}

fn load_or_generate_key(path: &Path) -> io::Result<Zeroizing<[u8; KEY_LEN]>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        match std::fs::OpenOptions::new().write(true).create_new(true).mode(0o600).open(path) {
            Ok(mut file) => {
                let mut key = [0u8; KEY_LEN];
                rand::rngs::OsRng.fill_bytes(&mut key);
                file.write_all(&key)?;
                return Ok(Zeroizing::new(key));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    #[cfg(not(unix))]
    if !path.exists() {
        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        std::fs::write(path, key)?;
        return Ok(Zeroizing::new(key));
    }

    let meta = std::fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Err(io::Error::other("refusing to read key file: path is a symlink"));
    }
    let bytes = Zeroizing::new(std::fs::read(path)?);
    if bytes.len() != KEY_LEN {
        return Err(io::Error::other(format!("key file has wrong length: {} bytes", bytes.len())));
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes);
    Ok(Zeroizing::new(key))
}

#[cfg(unix)]
fn enforce_owner_only_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::metadata(path)?;
    let mut perms = meta.permissions();
    if perms.mode() & 0o777 != 0o600 {
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn enforce_owner_only_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let store = CredentialStore::with_key([7u8; KEY_LEN]);
        let ciphertext = store.encrypt("hunter2").unwrap();
        assert!(CredentialStore::is_encrypted(&ciphertext));
        assert_eq!(store.decrypt(&ciphertext).unwrap(), "hunter2");
    }

    #[test]
    fn is_encrypted_rejects_plaintext() {
        assert!(!CredentialStore::is_encrypted("hunter2"));
    }

    #[test]
    fn decrypt_fails_on_tamper() {
        let store = CredentialStore::with_key([7u8; KEY_LEN]);
        let mut ciphertext = store.encrypt("hunter2").unwrap();
        ciphertext.push('x');
        assert!(store.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn decrypt_fails_with_wrong_key() {
        let a = CredentialStore::with_key([1u8; KEY_LEN]);
        let b = CredentialStore::with_key([2u8; KEY_LEN]);
        let ciphertext = a.encrypt("hunter2").unwrap();
        assert!(b.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn open_generates_key_file_with_owner_only_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("device.key");
        let _store = CredentialStore::open(&path).unwrap();
        assert!(path.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn open_reloads_existing_key_and_decrypts_prior_ciphertext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.key");
        let first = CredentialStore::open(&path).unwrap();
        let ciphertext = first.encrypt("hunter2").unwrap();
        let second = CredentialStore::open(&path).unwrap();
        assert_eq!(second.decrypt(&ciphertext).unwrap(), "hunter2");
    }
}
