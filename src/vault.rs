//! Authenticated file channel for persisted generator state.
//!
//! A vault is a value bound to one path. With an empty key it is a
//! transparent passthrough; with a 32-byte key the file body is the
//! AES-256-GCM ciphertext plus its 16-byte tag, nothing else - no
//! framing, no version byte, no stored IV.
//!
//! The IV is the fixed all-zero 16-byte vector. That is sound only
//! because a key is expected to be bound to exactly one state file:
//! the key, not the nonce, is the security boundary here. Changing to
//! a random IV prefix would break every file already on disk.

use aes_gcm::aead::generic_array::typenum::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Required key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// AES-256-GCM parameterised with the 16-byte IV the on-disk format
/// was built around.
type VaultCipher = AesGcm<Aes256, U16>;

/// Errors raised by vault I/O and cryptography.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The bound path could not be opened for reading.
    #[error("state file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// A non-empty key of the wrong length was supplied.
    #[error("encryption key must be {KEY_LEN} bytes, got {0}")]
    InvalidKey(usize),
    /// Decryption failed; the ciphertext or tag does not match the key.
    #[error("state file failed authentication")]
    AuthFailure,
    /// The cipher refused to seal the plaintext.
    #[error("cipher failure sealing state")]
    SealFailure,
    /// Underlying filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Authenticated file I/O bound to a single path.
#[derive(Debug, Clone)]
pub struct FileVault {
    path: PathBuf,
}

impl FileVault {
    /// Binds a vault to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns true if the bound path can be opened for reading.
    pub fn exists(&self) -> bool {
        fs::File::open(&self.path).is_ok()
    }

    /// The bound path.
    #[inline]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Writes `data` to the bound path, encrypting when `key` is
    /// non-empty. Only the key length is validated.
    pub fn write(&self, data: &[u8], key: &[u8]) -> Result<(), VaultError> {
        if key.is_empty() {
            fs::write(&self.path, data)?;
            return Ok(());
        }

        let cipher =
            VaultCipher::new_from_slice(key).map_err(|_| VaultError::InvalidKey(key.len()))?;
        let iv = GenericArray::<u8, U16>::default();
        let sealed = cipher
            .encrypt(&iv, data)
            .map_err(|_| VaultError::SealFailure)?;

        fs::write(&self.path, sealed)?;
        tracing::debug!(path = %self.path.display(), bytes = data.len(), "state sealed to disk");
        Ok(())
    }

    /// Reads the bound path, decrypting and authenticating when `key`
    /// is non-empty.
    pub fn read(&self, key: &[u8]) -> Result<Vec<u8>, VaultError> {
        if !self.exists() {
            return Err(VaultError::NotFound(self.path.clone()));
        }

        let contents = fs::read(&self.path)?;
        if key.is_empty() {
            return Ok(contents);
        }

        let cipher =
            VaultCipher::new_from_slice(key).map_err(|_| VaultError::InvalidKey(key.len()))?;
        let iv = GenericArray::<u8, U16>::default();
        cipher
            .decrypt(&iv, contents.as_slice())
            .map_err(|_| VaultError::AuthFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sequential_key() -> Vec<u8> {
        (0..KEY_LEN as u8).collect()
    }

    #[test]
    fn test_write_then_read_encrypted() {
        let dir = tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("test"));
        let key = sequential_key();
        let plaintext = b"abcdefghijklmnopqrstuvwxyz";

        vault.write(plaintext, &key).unwrap();
        assert_eq!(vault.read(&key).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let dir = tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("test"));

        vault.write(b"abcdefghijklmnopqrstuvwxyz", &sequential_key()).unwrap();
        assert!(matches!(
            vault.read(&[2u8; KEY_LEN]),
            Err(VaultError::AuthFailure)
        ));
    }

    #[test]
    fn test_empty_key_is_passthrough() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain");
        let vault = FileVault::new(&path);

        vault.write(b"123 456 789 ", &[]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"123 456 789 ");
        assert_eq!(vault.read(&[]).unwrap(), b"123 456 789 ");
    }

    #[test]
    fn test_invalid_key_length_refused() {
        let dir = tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("test"));

        assert!(matches!(
            vault.write(b"data", &[1u8; 16]),
            Err(VaultError::InvalidKey(16))
        ));

        vault.write(b"data", &sequential_key()).unwrap();
        assert!(matches!(
            vault.read(&[1u8; 31]),
            Err(VaultError::InvalidKey(31))
        ));
    }

    #[test]
    fn test_missing_file_not_found() {
        let dir = tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("absent"));
        assert!(matches!(vault.read(&[]), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn test_ciphertext_carries_tag_overhead() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sealed");
        let vault = FileVault::new(&path);

        vault.write(b"abcdefghijklmnopqrstuvwxyz", &sequential_key()).unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), 26 + 16);
    }

    #[test]
    fn test_any_flipped_byte_fails_authentication() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sealed");
        let vault = FileVault::new(&path);
        let key = sequential_key();

        vault.write(b"abcdefghijklmnopqrstuvwxyz", &key).unwrap();
        let sealed = fs::read(&path).unwrap();

        for position in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[position] ^= 0x01;
            fs::write(&path, &tampered).unwrap();
            assert!(
                matches!(vault.read(&key), Err(VaultError::AuthFailure)),
                "flip at byte {position} went undetected"
            );
        }
    }

    #[test]
    fn test_overwrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("state"));
        let key = sequential_key();

        vault.write(b"first", &key).unwrap();
        vault.write(b"second", &key).unwrap();
        assert_eq!(vault.read(&key).unwrap(), b"second");
    }
}
