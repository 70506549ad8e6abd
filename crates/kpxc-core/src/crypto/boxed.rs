// ============================================
// File: crates/kpxc-core/src/crypto/boxed.rs
// ============================================
//! # Authenticated Public-Key Encryption
//!
//! ## Creation Reason
//! Wraps `crypto_box::SalsaBox` (X25519 + XSalsa20-Poly1305), the exact
//! construction KeePassXC uses through libsodium's `crypto_box_easy`.
//!
//! ## Main Functionality
//! - `BoxCipher::new`: precompute the shared key from (own secret, peer public)
//! - `BoxCipher::encrypt`: seal a plaintext under a nonce
//! - `BoxCipher::decrypt`: open a ciphertext, failing closed on a bad tag
//!
//! ## Wire Format
//! ```text
//! ┌──────────────────────┬──────────────────────────┐
//! │ Poly1305 tag (16 B)  │ XSalsa20 ciphertext      │
//! └──────────────────────┴──────────────────────────┘
//! ```
//! Same layout as `crypto_box_easy`; the nonce travels separately in the
//! envelope.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Decryption failure must never be swallowed, it signals a spoofed peer
//! - The precomputed cipher is tied to ONE peer key; a new peer key needs a
//!   new `BoxCipher`
//!
//! ## Last Modified
//! v0.1.0 - Initial box implementation

use std::fmt;

use crypto_box::aead::{generic_array::GenericArray, Aead};
use crypto_box::SalsaBox;

use super::{BoxPublicKey, Nonce, SessionKeyPair};
use crate::error::{CoreError, Result};

/// Precomputed box for one (own key pair, peer public key) combination.
pub struct BoxCipher {
    inner: SalsaBox,
    peer: BoxPublicKey,
}

impl BoxCipher {
    /// Creates a cipher from our session key pair and the peer's public key.
    #[must_use]
    pub fn new(own: &SessionKeyPair, peer: &BoxPublicKey) -> Self {
        let inner = SalsaBox::new(&peer.to_crypto_box(), &own.secret_key());
        Self { inner, peer: *peer }
    }

    /// Returns the peer key this cipher was built for.
    #[must_use]
    pub const fn peer_key(&self) -> &BoxPublicKey {
        &self.peer
    }

    /// Seals `plaintext` under `nonce`.
    ///
    /// # Errors
    /// Returns `Encryption` if the AEAD layer rejects the input.
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .encrypt(GenericArray::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|_| CoreError::Encryption {
                context: "box seal".to_string(),
            })
    }

    /// Opens `ciphertext` sealed under `nonce`.
    ///
    /// # Errors
    /// Returns `AuthenticationFailed` if the tag does not verify.
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .decrypt(GenericArray::from_slice(nonce.as_bytes()), ciphertext)
            .map_err(|_| CoreError::AuthenticationFailed)
    }
}

impl fmt::Debug for BoxCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxCipher")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TAG_SIZE;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pair_of_ciphers(seed: u64) -> (BoxCipher, BoxCipher) {
        let mut rng = StdRng::seed_from_u64(seed);
        let client = SessionKeyPair::generate(&mut rng);
        let server = SessionKeyPair::generate(&mut rng);
        (
            BoxCipher::new(&client, server.public_key()),
            BoxCipher::new(&server, client.public_key()),
        )
    }

    #[test]
    fn test_seal_and_open_across_peers() {
        let (client, server) = pair_of_ciphers(1);
        let nonce = Nonce::random(&mut StdRng::seed_from_u64(2));

        let sealed = client.encrypt(&nonce, b"{\"action\":\"get-databasehash\"}").unwrap();
        assert_eq!(sealed.len(), 29 + TAG_SIZE);

        let opened = server.decrypt(&nonce, &sealed).unwrap();
        assert_eq!(opened, b"{\"action\":\"get-databasehash\"}");
    }

    #[test]
    fn test_cipher_rebuilt_from_shared_key_pair_interoperates() {
        let mut rng = StdRng::seed_from_u64(7);
        let shared = SessionKeyPair::generate(&mut rng);
        let peer = SessionKeyPair::generate(&mut rng);
        let first = BoxCipher::new(&shared, peer.public_key());
        let second = BoxCipher::new(&shared.clone(), peer.public_key());
        let nonce = Nonce::random(&mut rng);

        let sealed = first.encrypt(&nonce, b"{}").unwrap();
        assert_eq!(second.decrypt(&nonce, &sealed).unwrap(), b"{}");
        assert_eq!(second.peer_key(), peer.public_key());
    }

    #[test]
    fn test_every_single_bit_flip_fails() {
        let (client, server) = pair_of_ciphers(3);
        let nonce = Nonce::random(&mut StdRng::seed_from_u64(4));
        let sealed = client.encrypt(&nonce, b"secret entry").unwrap();

        for index in 0..sealed.len() {
            for bit in 0..8 {
                let mut tampered = sealed.clone();
                tampered[index] ^= 1 << bit;
                assert!(matches!(
                    server.decrypt(&nonce, &tampered),
                    Err(CoreError::AuthenticationFailed)
                ));
            }
        }
    }

    #[test]
    fn test_wrong_nonce_or_key_fails() {
        let (client, server) = pair_of_ciphers(5);
        let nonce = Nonce::random(&mut StdRng::seed_from_u64(6));
        let sealed = client.encrypt(&nonce, b"payload").unwrap();

        assert!(matches!(
            server.decrypt(&nonce.increment(), &sealed),
            Err(CoreError::AuthenticationFailed)
        ));

        let (_, stranger) = pair_of_ciphers(7);
        assert!(matches!(
            stranger.decrypt(&nonce, &sealed),
            Err(CoreError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let (client, server) = pair_of_ciphers(8);
        let nonce = Nonce::random(&mut StdRng::seed_from_u64(9));
        let sealed = client.encrypt(&nonce, b"x").unwrap();
        assert!(server.decrypt(&nonce, &sealed[..TAG_SIZE - 1]).is_err());
    }
}
