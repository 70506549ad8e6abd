// ============================================
// File: crates/kpxc-core/src/identity.rs
// ============================================
//! # Session Identity
//!
//! ## Creation Reason
//! Bundles everything one side of a browser-protocol session needs to
//! seal and open payloads: the client id, the ephemeral session key pair,
//! the long-term id key, the learned peer key and the association handle.
//!
//! ## Main Functionality
//! - Key generation from an injected random source
//! - Peer key installation after `change-public-keys`
//! - Payload encryption/decryption (raw bytes and base64 wire form)
//! - Association record extraction and injection
//!
//! ## Lifecycle
//! ```text
//! generate() ──► set_peer_public_key() ──► encrypt()/decrypt()
//!     │                                         │
//!     └── apply_association() ◄── persisted ────┘ association_record()
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - encrypt/decrypt before the peer key is set MUST fail (`InvalidState`)
//! - An identity belongs to exactly one session; never share one between
//!   the two legs of the interceptor
//! - Only the public half of the id key exists; the server never asks for
//!   proof of the secret half
//!
//! ## Last Modified
//! v0.1.0 - Initial identity model

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use kpxc_common::ClientId;

use crate::crypto::{BoxCipher, BoxPublicKey, Nonce, SessionKeyPair};
use crate::error::{CoreError, Result};

// ============================================
// AssociationRecord
// ============================================

/// Persisted trust relationship with a KeePassXC database.
///
/// Serialized as `{"IdKey": "<base64>", "AId": "<association id>"}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationRecord {
    /// Base64 of the 32-byte id public key.
    #[serde(rename = "IdKey")]
    pub id_key: String,
    /// Server-assigned association id.
    #[serde(rename = "AId")]
    pub association_id: String,
}

impl fmt::Debug for AssociationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationRecord")
            .field("association_id", &self.association_id)
            .finish_non_exhaustive()
    }
}

// ============================================
// Identity
// ============================================

/// Key material and association state of one protocol session.
pub struct Identity {
    client_id: ClientId,
    session: SessionKeyPair,
    id_key: BoxPublicKey,
    cipher: Option<BoxCipher>,
    association_id: Option<String>,
}

impl Identity {
    /// Creates an identity with a fresh session key pair and id key.
    pub fn generate<R>(client_id: ClientId, rng: &mut R) -> Self
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let session = SessionKeyPair::generate(rng);
        Self::with_session_key(client_id, session, rng)
    }

    /// Creates an identity around an existing session key pair.
    ///
    /// A fresh id key is still drawn from `rng`.
    pub fn with_session_key<R>(client_id: ClientId, session: SessionKeyPair, rng: &mut R) -> Self
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let id_key = *SessionKeyPair::generate(rng).public_key();
        Self {
            client_id,
            session,
            id_key,
            cipher: None,
            association_id: None,
        }
    }

    // ========================================
    // Key Management
    // ========================================

    /// Replaces the session key pair. Any learned peer key is forgotten.
    pub fn regenerate_session_key<R>(&mut self, rng: &mut R)
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        self.session = SessionKeyPair::generate(rng);
        self.cipher = None;
    }

    /// Replaces the id key. The association no longer matches and is dropped.
    pub fn regenerate_id_key<R>(&mut self, rng: &mut R)
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        self.id_key = *SessionKeyPair::generate(rng).public_key();
        self.association_id = None;
    }

    /// Returns the client id sent in clear with every envelope.
    #[must_use]
    pub const fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Returns the session key pair.
    #[must_use]
    pub const fn session_key(&self) -> &SessionKeyPair {
        &self.session
    }

    /// Returns the session public key.
    #[must_use]
    pub const fn public_key(&self) -> &BoxPublicKey {
        self.session.public_key()
    }

    /// Returns the long-term id public key.
    #[must_use]
    pub const fn id_public_key(&self) -> &BoxPublicKey {
        &self.id_key
    }

    /// Session public key in wire form.
    #[must_use]
    pub fn export_public_key(&self) -> String {
        self.session.public_key().to_base64()
    }

    /// Id public key in wire form.
    #[must_use]
    pub fn export_id_public_key(&self) -> String {
        self.id_key.to_base64()
    }

    /// Installs the peer's session key from its base64 wire form.
    ///
    /// # Errors
    /// Returns `InvalidKey` if the encoding is malformed or the length is wrong.
    pub fn set_peer_public_key(&mut self, encoded: &str) -> Result<()> {
        let peer = BoxPublicKey::from_base64(encoded)?;
        self.set_peer_key(peer);
        Ok(())
    }

    /// Installs an already decoded peer key.
    pub fn set_peer_key(&mut self, peer: BoxPublicKey) {
        debug!(
            client_id = %self.client_id,
            peer = %peer.fingerprint(),
            "Peer session key installed"
        );
        self.cipher = Some(BoxCipher::new(&self.session, &peer));
    }

    /// Returns the learned peer key, if any.
    #[must_use]
    pub fn peer_public_key(&self) -> Option<&BoxPublicKey> {
        self.cipher.as_ref().map(BoxCipher::peer_key)
    }

    /// Returns `true` once the peer key is known.
    #[must_use]
    pub const fn has_peer_key(&self) -> bool {
        self.cipher.is_some()
    }

    // ========================================
    // Encryption
    // ========================================

    fn cipher(&self, operation: &str) -> Result<&BoxCipher> {
        self.cipher
            .as_ref()
            .ok_or_else(|| CoreError::invalid_state(operation, "peer public key"))
    }

    /// Seals `plaintext` for the peer under `nonce`.
    ///
    /// # Errors
    /// `InvalidState` before the peer key is set.
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher("encrypt")?.encrypt(nonce, plaintext)
    }

    /// Opens a ciphertext sent by the peer under `nonce`.
    ///
    /// # Errors
    /// `InvalidState` before the peer key is set, `AuthenticationFailed` if
    /// the tag does not verify.
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher("decrypt")?.decrypt(nonce, ciphertext)
    }

    /// Seals and base64-encodes, producing the envelope `message` field.
    ///
    /// # Errors
    /// Same as [`Identity::encrypt`].
    pub fn seal(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<String> {
        self.encrypt(nonce, plaintext).map(|c| BASE64.encode(c))
    }

    /// Decodes and opens an envelope `message` field.
    ///
    /// # Errors
    /// `MalformedEnvelope` on bad base64, otherwise as [`Identity::decrypt`].
    pub fn open(&self, nonce: &Nonce, message: &str) -> Result<Vec<u8>> {
        let cipher = self.cipher("decrypt")?;
        let ciphertext = BASE64
            .decode(message.trim())
            .map_err(|e| CoreError::malformed(format!("message is not base64: {e}")))?;
        cipher.decrypt(nonce, &ciphertext)
    }

    /// Successor of `nonce` under the protocol's increment rule.
    #[must_use]
    pub fn increment_nonce(nonce: &Nonce) -> Nonce {
        nonce.increment()
    }

    // ========================================
    // Association
    // ========================================

    /// Returns the association id, if associated.
    #[must_use]
    pub fn association_id(&self) -> Option<&str> {
        self.association_id.as_deref()
    }

    /// Stores the association id returned by `associate`.
    pub fn set_association_id(&mut self, id: impl Into<String>) {
        self.association_id = Some(id.into());
    }

    /// Extracts the record to persist.
    ///
    /// # Errors
    /// `InvalidState` if no association exists yet.
    pub fn association_record(&self) -> Result<AssociationRecord> {
        let association_id = self
            .association_id
            .clone()
            .ok_or_else(|| CoreError::invalid_state("association_record", "association id"))?;
        Ok(AssociationRecord {
            id_key: self.id_key.to_base64(),
            association_id,
        })
    }

    /// Restores a persisted association (id key and association id).
    ///
    /// # Errors
    /// `InvalidKey` if the stored id key is malformed, `MissingData` if the
    /// association id is empty.
    pub fn apply_association(&mut self, record: &AssociationRecord) -> Result<()> {
        let id_key = BoxPublicKey::from_base64(&record.id_key)?;
        if record.association_id.is_empty() {
            return Err(CoreError::missing("AId"));
        }
        self.id_key = id_key;
        self.association_id = Some(record.association_id.clone());
        Ok(())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("client_id", &self.client_id)
            .field("public_key", self.session.public_key())
            .field("id_key", &self.id_key)
            .field("peer", &self.peer_public_key())
            .field("association_id", &self.association_id)
            .finish()
    }
}

// ============================================
// Tests
// ============================================
