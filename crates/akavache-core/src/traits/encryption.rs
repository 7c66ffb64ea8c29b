//! At-rest encryption for serialized payloads

use crate::CacheError;

/// Applied between the serializer and the backend: `encrypt` runs
/// immediately before a write reaches [`crate::CacheBackend::insert`],
/// `decrypt` immediately after a read returns from it.
pub trait EncryptionProvider: Send + Sync + 'static {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CacheError>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CacheError>;
}

/// Pass-through provider; the default for caches opened without a key.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEncryptionProvider;

impl EncryptionProvider for NoopEncryptionProvider {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CacheError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CacheError> {
        Ok(ciphertext.to_vec())
    }
}

#[cfg(feature = "encryption")]
mod xchacha {
    use chacha20poly1305::{
        aead::{Aead, AeadCore, KeyInit, OsRng},
        XChaCha20Poly1305, XNonce,
    };

    use super::*;

    const NONCE_LEN: usize = 24;

    /// XChaCha20-Poly1305 provider. The caller supplies a 32-byte key,
    /// standing in for the OS credential-store lookup the store's
    /// "Secure" cache would otherwise perform.
    pub struct XChaChaEncryptionProvider {
        cipher: XChaCha20Poly1305,
    }

    impl XChaChaEncryptionProvider {
        pub fn from_key_bytes(key: &[u8; 32]) -> Self {
            Self {
                cipher: XChaCha20Poly1305::new(key.into()),
            }
        }
    }

    impl EncryptionProvider for XChaChaEncryptionProvider {
        fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CacheError> {
            let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
            let mut ciphertext = self
                .cipher
                .encrypt(&nonce, plaintext)
                .map_err(|e| CacheError::Crypto(e.to_string()))?;
            let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
            out.extend_from_slice(nonce.as_slice());
            out.append(&mut ciphertext);
            Ok(out)
        }

        fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CacheError> {
            if ciphertext.len() < NONCE_LEN {
                return Err(CacheError::Crypto("ciphertext shorter than nonce".into()));
            }
            let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
            let nonce = XNonce::from_slice(nonce_bytes);
            self.cipher
                .decrypt(nonce, body)
                .map_err(|e| CacheError::Crypto(e.to_string()))
        }
    }
}

#[cfg(feature = "encryption")]
pub use xchacha::XChaChaEncryptionProvider;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_roundtrips() {
        let provider = NoopEncryptionProvider;
        let ciphertext = provider.encrypt(b"hello").unwrap();
        assert_eq!(ciphertext, b"hello");
        assert_eq!(provider.decrypt(&ciphertext).unwrap(), b"hello");
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn xchacha_roundtrips() {
        let key = [7u8; 32];
        let provider = XChaChaEncryptionProvider::from_key_bytes(&key);
        let ciphertext = provider.encrypt(b"top secret").unwrap();
        assert_ne!(ciphertext, b"top secret");
        assert_eq!(provider.decrypt(&ciphertext).unwrap(), b"top secret");
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn xchacha_rejects_tampered_ciphertext() {
        let key = [3u8; 32];
        let provider = XChaChaEncryptionProvider::from_key_bytes(&key);
        let mut ciphertext = provider.encrypt(b"data").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(provider.decrypt(&ciphertext).is_err());
    }
}
