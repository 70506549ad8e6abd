// ============================================
// File: crates/kpxc-browser/src/client.rs
// ============================================
//! # Protocol Client
//!
//! ## Creation Reason
//! Drives a KeePassXC browser session from the browser-extension side:
//! the public key exchange, the association handshake and every encrypted
//! action after that.
//!
//! ## Main Functionality
//! - `ProtocolClient`: one connection, one identity, one request in flight
//! - `change_public_keys` / `associate` / `test_associate`
//! - `send_action`: generic typed exchange for every other action
//! - Typed wrappers (`get_logins`, `get_totp`, ...)
//! - `poll_notification`: unsolicited `database-locked`/`database-unlocked`
//!
//! ## Session State Machine
//! ```text
//!   New ──change_public_keys──► KeysExchanged ──associate──────► Associated
//!                                     │                              │
//!                                     └──test_associate──► Active ◄──┘ test_associate
//!
//!   any ──integrity failure / close──► Closed
//! ```
//!
//! ## Exchange
//! ```text
//! ┌──────────────┐   nonce N, message = box(N, payload)   ┌────────────┐
//! │ ProtocolClient│ ─────────────────────────────────────► │ KeePassXC  │
//! │              │ ◄───────────────────────────────────── │            │
//! └──────────────┘   nonce N+1, message = box(N+1, reply) └────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The nonce check is the only replay/injection defense: it runs on every
//!   reply that carries a nonce, successful or not
//! - Authentication and nonce failures close the client; never retry them
//! - `lock-database` is acknowledged in clear and its reply is never opened
//! - Remote errors leave the session usable
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol client

use std::fmt;
use std::time::Duration;

use serde_json::Map;
use tracing::{debug, info, trace, warn};

use kpxc_common::RequestId;
use kpxc_core::protocol::{
    AssociateRequest, AssociationKey, CreateNewGroupRequest, CreateNewGroupResponse,
    GeneratePasswordRequest, GeneratePasswordResponse, GetDatabaseGroupsRequest,
    GetDatabaseGroupsResponse, GetDatabaseHashRequest, GetDatabaseHashResponse, GetLoginsRequest,
    GetLoginsResponse, GetTotpRequest, GetTotpResponse, LockDatabaseRequest, LockDatabaseResponse,
    SetLoginRequest, SetLoginResponse, TestAssociateRequest, BUF_SIZE,
};
use kpxc_core::{
    Action, ActionRequest, ActionResponse, AssociationRecord, BoxPublicKey, CoreError, Envelope,
    Identity, Nonce, Notification, RandomSource,
};
use kpxc_transport::Connection;

use crate::config::ConnectionConfig;
use crate::error::{BrowserError, Result};
use crate::exchange::{check_reply, receive_reply, STRAY_FRAME_LEN};

// ============================================
// ClientState
// ============================================

/// Where a client is in its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing exchanged yet.
    New,
    /// Peer public key known; encrypted actions possible.
    KeysExchanged,
    /// A fresh association was just approved.
    Associated,
    /// A stored association was confirmed.
    Active,
    /// Closed, by request or after an integrity failure.
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::KeysExchanged => "keys-exchanged",
            Self::Associated => "associated",
            Self::Active => "active",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================
// ClientOptions
// ============================================

/// Receive limits for a client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Timeout for ordinary replies (`None` waits forever).
    pub receive_timeout: Option<Duration>,
    /// Timeout for `generate-password`, which waits on the user.
    pub generate_password_timeout: Option<Duration>,
    /// Largest reply accepted.
    pub max_message_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            receive_timeout: None,
            generate_password_timeout: None,
            max_message_size: BUF_SIZE,
        }
    }
}

impl From<&ConnectionConfig> for ClientOptions {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            receive_timeout: config.receive_timeout(),
            generate_password_timeout: config.generate_password_timeout(),
            max_message_size: config.max_message_size,
        }
    }
}

// ============================================
// ProtocolClient
// ============================================

/// Browser-side protocol session over one connection.
///
/// # Example
/// ```ignore
/// let mut rng = rand::rngs::OsRng;
/// let identity = Identity::generate(ClientId::generate(&mut rng), &mut rng);
/// let mut client = ProtocolClient::new(UnixConnection::new(), identity, os_random());
///
/// client.connect(&socket).await?;
/// client.change_public_keys().await?;
/// let record = client.associate().await?;
/// let logins = client.get_logins("https://example.org", None, false).await?;
/// ```
pub struct ProtocolClient<C> {
    conn: C,
    identity: Identity,
    state: ClientState,
    rng: Box<dyn RandomSource>,
    options: ClientOptions,
}

impl<C: Connection> ProtocolClient<C> {
    /// Creates a client in state `New`.
    pub fn new(conn: C, identity: Identity, rng: Box<dyn RandomSource>) -> Self {
        Self {
            conn,
            identity,
            state: ClientState::New,
            rng,
            options: ClientOptions::default(),
        }
    }

    /// Replaces the receive limits.
    #[must_use]
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Current state.
    pub const fn state(&self) -> ClientState {
        self.state
    }

    /// The client's identity.
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Restores a persisted association before `test_associate`.
    ///
    /// # Errors
    /// `InvalidKey` / `MissingData` for a malformed record.
    pub fn restore_association(&mut self, record: &AssociationRecord) -> Result<()> {
        self.identity.apply_association(record)?;
        debug!(
            client_id = %self.identity.client_id(),
            association_id = %record.association_id,
            "Association restored"
        );
        Ok(())
    }

    /// The underlying connection.
    pub const fn connection(&self) -> &C {
        &self.conn
    }

    /// Opens the connection to KeePassXC.
    ///
    /// # Errors
    /// `StateError` once closed, transport errors otherwise.
    pub async fn connect(&mut self, address: &str) -> Result<()> {
        self.ensure_open("connect")?;
        self.conn.connect(address).await?;
        info!(client_id = %self.identity.client_id(), address = %address, "Connected to KeePassXC");
        Ok(())
    }

    // ========================================
    // Handshake
    // ========================================

    /// Exchanges session public keys in clear.
    ///
    /// # Errors
    /// `HandshakeFailed` if KeePassXC reports failure or sends no usable
    /// key, `NonceMismatch` on a bad reply nonce, transport errors.
    pub async fn change_public_keys(&mut self) -> Result<()> {
        let action = Action::ChangePublicKeys;
        self.ensure_open(action.as_str())?;

        let nonce = Nonce::random(&mut *self.rng);
        let request = Envelope::request(action, self.identity.client_id(), &nonce)
            .with_public_key(self.identity.public_key());
        debug!(action = %action, client_id = %self.identity.client_id(), "Sending public key");

        let result = match self.round_trip(&request, action, self.options.receive_timeout).await {
            Ok(reply) => server_key(&nonce, &reply),
            Err(e) => Err(e),
        };
        let server_key = self.guard(result).await?;

        self.identity.set_peer_key(server_key);
        self.state = ClientState::KeysExchanged;
        info!(
            client_id = %self.identity.client_id(),
            server_key = %server_key.fingerprint(),
            "Public keys exchanged"
        );
        Ok(())
    }

    /// Registers the id key with KeePassXC; the user must approve it there.
    ///
    /// Returns the record to persist.
    ///
    /// # Errors
    /// `AssociationDenied` if the user or KeePassXC refuses, `StateError`
    /// before the key exchange.
    pub async fn associate(&mut self) -> Result<AssociationRecord> {
        let request = AssociateRequest {
            key: *self.identity.public_key(),
            id_key: *self.identity.id_public_key(),
            extra: Map::new(),
        };
        let response = self
            .send_action(&request, self.options.receive_timeout)
            .await
            .map_err(BrowserError::from_associate_failure)?;

        let id = response
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CoreError::missing("id"))?;
        self.identity.set_association_id(id);
        self.state = ClientState::Associated;
        info!(
            client_id = %self.identity.client_id(),
            association_id = ?self.identity.association_id(),
            "Association approved"
        );
        Ok(self.identity.association_record()?)
    }

    /// Confirms the stored association without creating a new one.
    ///
    /// # Errors
    /// `AssociationRejected` if KeePassXC no longer knows it (fall back to
    /// `associate`), `StateError` without a stored association.
    pub async fn test_associate(&mut self) -> Result<()> {
        let id = self
            .identity
            .association_id()
            .ok_or_else(|| CoreError::invalid_state("test-associate", "an association id"))?
            .to_string();
        let request = TestAssociateRequest {
            id,
            key: *self.identity.id_public_key(),
            extra: Map::new(),
        };
        self.send_action(&request, self.options.receive_timeout)
            .await
            .map_err(BrowserError::from_test_associate_failure)?;

        self.state = ClientState::Active;
        info!(client_id = %self.identity.client_id(), "Association confirmed");
        Ok(())
    }

    // ========================================
    // Generic Exchange
    // ========================================

    /// Sends one encrypted action and returns its typed reply.
    ///
    /// # Errors
    /// - `Remote` if KeePassXC reports failure (session stays usable)
    /// - `NonceMismatch` / `AuthenticationFailed` (session is closed)
    /// - `StateError` before the key exchange or after close
    /// - transport errors, including `Timeout`
    pub async fn send_action<R: ActionRequest>(
        &mut self,
        request: &R,
        timeout: Option<Duration>,
    ) -> Result<R::Response> {
        self.send_action_with_id(request, None, timeout).await
    }

    async fn send_action_with_id<R: ActionRequest>(
        &mut self,
        request: &R,
        request_id: Option<&RequestId>,
        timeout: Option<Duration>,
    ) -> Result<R::Response> {
        let action = R::ACTION;
        self.ensure_keys(action)?;

        let nonce = Nonce::random(&mut *self.rng);
        let payload = request.to_json()?;
        trace!(action = %action, payload = %String::from_utf8_lossy(&payload), "Request payload");

        let mut envelope = Envelope::request(action, self.identity.client_id(), &nonce);
        if let Some(request_id) = request_id {
            envelope = envelope.with_request_id(request_id);
        }
        envelope.message = Some(self.identity.seal(&nonce, &payload)?);
        debug!(action = %action, client_id = %self.identity.client_id(), "Sending request");

        let result = self.complete::<R::Response>(action, &nonce, &envelope, timeout).await;
        self.guard(result).await
    }

    async fn complete<T: ActionResponse>(
        &mut self,
        action: Action,
        nonce: &Nonce,
        envelope: &Envelope,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let mut reply = self.round_trip(envelope, action, timeout).await?;
        let reply_nonce = check_reply(nonce, action, &reply)?;

        if !action.has_encrypted_response() {
            // Clear acknowledgement: the record is read off the envelope itself.
            reply.message = None;
            let record = T::from_json(action, &reply.to_bytes()?)?;
            record.status().check()?;
            debug!(action = %action, "Clear acknowledgement received");
            return Ok(record);
        }

        let reply_nonce = reply_nonce
            .ok_or_else(|| CoreError::malformed(format!("'{action}' reply carries no nonce")))?;
        let sealed = reply
            .message()
            .ok_or_else(|| CoreError::malformed(format!("'{action}' reply carries no message")))?;
        let plaintext = self.identity.open(&reply_nonce, sealed)?;
        trace!(action = %action, payload = %String::from_utf8_lossy(&plaintext), "Reply payload");

        let record = T::from_json(action, &plaintext)?;
        record.status().check()?;
        debug!(action = %action, client_id = %self.identity.client_id(), "Reply accepted");
        Ok(record)
    }

    async fn round_trip(
        &mut self,
        request: &Envelope,
        action: Action,
        timeout: Option<Duration>,
    ) -> Result<Envelope> {
        self.conn.send(&request.to_bytes()?).await?;
        receive_reply(&mut self.conn, action, self.options.max_message_size, timeout).await
    }

    // ========================================
    // Typed Actions
    // ========================================

    /// `get-databasehash`; the hash is in `status.hash`.
    ///
    /// # Errors
    /// See [`Self::send_action`].
    pub async fn get_database_hash(&mut self) -> Result<GetDatabaseHashResponse> {
        self.send_action(&GetDatabaseHashRequest::default(), self.options.receive_timeout)
            .await
    }

    /// `generate-password`, with its own timeout and a request id.
    ///
    /// # Errors
    /// See [`Self::send_action`].
    pub async fn generate_password(&mut self) -> Result<GeneratePasswordResponse> {
        let request_id = RequestId::generate(&mut *self.rng);
        let request = GeneratePasswordRequest {
            request_id: Some(request_id.as_str().to_string()),
            extra: Map::new(),
        };
        self.send_action_with_id(
            &request,
            Some(&request_id),
            self.options.generate_password_timeout,
        )
        .await
    }

    /// `get-logins` for `url`, keyed by this client's association.
    ///
    /// # Errors
    /// `StateError` without an association; see [`Self::send_action`].
    pub async fn get_logins(
        &mut self,
        url: &str,
        submit_url: Option<&str>,
        http_auth: bool,
    ) -> Result<GetLoginsResponse> {
        let request = GetLoginsRequest {
            url: url.to_string(),
            submit_url: submit_url.map(str::to_string),
            http_auth: http_auth.then(|| "true".to_string()),
            keys: vec![self.association_key("get-logins")?],
            extra: Map::new(),
        };
        self.send_action(&request, self.options.receive_timeout).await
    }

    /// `set-login`; the association id is filled in.
    ///
    /// # Errors
    /// `StateError` without an association; see [`Self::send_action`].
    pub async fn set_login(&mut self, mut request: SetLoginRequest) -> Result<SetLoginResponse> {
        request.id = self.association_key("set-login")?.id;
        self.send_action(&request, self.options.receive_timeout).await
    }

    /// `lock-database`; acknowledged in clear.
    ///
    /// # Errors
    /// See [`Self::send_action`].
    pub async fn lock_database(&mut self) -> Result<LockDatabaseResponse> {
        self.send_action(&LockDatabaseRequest::default(), self.options.receive_timeout)
            .await
    }

    /// `get-database-groups`.
    ///
    /// # Errors
    /// See [`Self::send_action`].
    pub async fn get_database_groups(&mut self) -> Result<GetDatabaseGroupsResponse> {
        self.send_action(&GetDatabaseGroupsRequest::default(), self.options.receive_timeout)
            .await
    }

    /// `create-new-group`; `name` may be a `/`-separated path.
    ///
    /// # Errors
    /// See [`Self::send_action`].
    pub async fn create_new_group(&mut self, name: &str) -> Result<CreateNewGroupResponse> {
        let request = CreateNewGroupRequest {
            group_name: name.to_string(),
            extra: Map::new(),
        };
        self.send_action(&request, self.options.receive_timeout).await
    }

    /// `get-totp` for the entry `uuid`.
    ///
    /// # Errors
    /// See [`Self::send_action`].
    pub async fn get_totp(&mut self, uuid: &str) -> Result<GetTotpResponse> {
        let request = GetTotpRequest {
            uuid: uuid.to_string(),
            extra: Map::new(),
        };
        self.send_action(&request, self.options.receive_timeout).await
    }

    // ========================================
    // Notifications
    // ========================================

    /// Waits for an unsolicited notification while no request is in flight.
    ///
    /// Returns `None` when the timeout elapses or a stray frame arrives.
    ///
    /// # Errors
    /// `UnexpectedAction` if something other than a notification arrives,
    /// transport errors other than a timeout.
    pub async fn poll_notification(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<Notification>> {
        self.ensure_open("poll_notification")?;

        let raw = match self.conn.receive(self.options.max_message_size, timeout).await {
            Ok(raw) => raw,
            Err(e) if e.is_timeout() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if raw.len() == STRAY_FRAME_LEN {
            return Ok(None);
        }

        let envelope = Envelope::parse(&raw)?;
        match Notification::from_action(envelope.action()?) {
            Some(notification) => {
                info!(
                    client_id = %self.identity.client_id(),
                    notification = %envelope.action,
                    "Notification received"
                );
                Ok(Some(notification))
            }
            None => Err(CoreError::unexpected("a notification", envelope.action).into()),
        }
    }

    /// Closes the connection. Closing twice is harmless.
    ///
    /// # Errors
    /// Transport errors from the shutdown.
    pub async fn close(&mut self) -> Result<()> {
        self.state = ClientState::Closed;
        self.conn.close().await?;
        debug!(client_id = %self.identity.client_id(), "Client closed");
        Ok(())
    }

    // ========================================
    // Helpers
    // ========================================

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.state == ClientState::Closed {
            return Err(CoreError::invalid_state(operation, "an open session").into());
        }
        Ok(())
    }

    fn ensure_keys(&self, action: Action) -> Result<()> {
        self.ensure_open(action.as_str())?;
        if !self.identity.has_peer_key() {
            return Err(CoreError::invalid_state(action.as_str(), "exchanged public keys").into());
        }
        Ok(())
    }

    fn association_key(&self, operation: &str) -> Result<AssociationKey> {
        let id = self
            .identity
            .association_id()
            .ok_or_else(|| CoreError::invalid_state(operation, "an association id"))?;
        Ok(AssociationKey {
            id: id.to_string(),
            key: *self.identity.id_public_key(),
        })
    }

    /// Closes the session if `result` is an integrity failure.
    async fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_integrity_failure() {
                warn!(
                    client_id = %self.identity.client_id(),
                    error = %e,
                    "Integrity failure, closing session"
                );
                self.state = ClientState::Closed;
                // The session is already unusable; a failed shutdown changes nothing.
                let _ = self.conn.close().await;
            }
        }
        result
    }
}

fn server_key(nonce: &Nonce, reply: &Envelope) -> Result<BoxPublicKey> {
    match check_reply(nonce, Action::ChangePublicKeys, reply) {
        Ok(_) => {}
        Err(BrowserError::Core(CoreError::Remote { message, .. })) => {
            return Err(BrowserError::handshake_failed(message));
        }
        Err(e) => return Err(e),
    }
    let encoded = reply
        .public_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| BrowserError::handshake_failed("reply carries no public key"))?;
    BoxPublicKey::from_base64(encoded).map_err(|e| BrowserError::handshake_failed(e.to_string()))
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kpxc_common::ClientId;
    use kpxc_core::RequestPayload;
    use kpxc_transport::{MockConnection, MockHandle};
    use parking_lot::Mutex;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::testing::{FakeKeePassXc, NonceMode, DATABASE_HASH};

    struct Harness {
        client: ProtocolClient<MockConnection>,
        peer: Arc<Mutex<FakeKeePassXc>>,
        handle: MockHandle,
    }

    fn harness(seed: u64) -> Harness {
        let peer = FakeKeePassXc::shared(seed);
        let conn = FakeKeePassXc::connection(&peer);
        let handle = conn.handle();
        let mut rng = StdRng::seed_from_u64(seed + 100);
        let identity = Identity::generate(ClientId::generate(&mut rng), &mut rng);
        let client = ProtocolClient::new(conn, identity, Box::new(rng));
        Harness {
            client,
            peer,
            handle,
        }
    }

    async fn associated(seed: u64) -> Harness {
        let mut h = harness(seed);
        h.client.connect("/tmp/kpxc.sock").await.unwrap();
        h.client.change_public_keys().await.unwrap();
        h.client.associate().await.unwrap();
        h
    }

    #[tokio::test]
    async fn test_key_exchange_then_database_hash() {
        let mut h = harness(1);
        h.client.connect("/tmp/kpxc.sock").await.unwrap();
        assert_eq!(h.handle.connected_address().as_deref(), Some("/tmp/kpxc.sock"));

        h.client.change_public_keys().await.unwrap();
        assert_eq!(h.client.state(), ClientState::KeysExchanged);
        assert_eq!(
            h.client.identity().peer_public_key(),
            Some(&h.peer.lock().public_key())
        );
        assert_eq!(h.peer.lock().client_key, Some(*h.client.identity().public_key()));

        let hash = h.client.get_database_hash().await.unwrap();
        assert_eq!(hash.status.hash.as_deref(), Some(DATABASE_HASH));

        let sent = h.handle.take_sent();
        let request = Envelope::parse(&sent[1]).unwrap();
        assert_eq!(request.action, "get-databasehash");
        assert!(request.message().is_some());
        assert_eq!(request.client_id.as_deref(), Some(h.client.identity().client_id().as_str()));
    }

    #[tokio::test]
    async fn test_encrypted_action_before_key_exchange_fails() {
        let mut h = harness(2);
        let err = h.client.get_database_hash().await.unwrap_err();
        assert!(err.is_state_error());
        assert_eq!(h.handle.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_reply_with_same_nonce_is_rejected_and_closes() {
        let mut h = harness(3);
        h.client.change_public_keys().await.unwrap();
        h.peer.lock().script.nonce = NonceMode::Same;

        let err = h.client.get_database_hash().await.unwrap_err();
        assert!(matches!(err, BrowserError::Core(CoreError::NonceMismatch)));
        assert_eq!(h.client.state(), ClientState::Closed);
        assert!(!h.handle.is_connected());

        assert!(h.client.get_database_hash().await.unwrap_err().is_state_error());
    }

    #[tokio::test]
    async fn test_reply_skipping_a_nonce_is_rejected() {
        let mut h = harness(4);
        h.client.change_public_keys().await.unwrap();
        h.peer.lock().script.nonce = NonceMode::SkipOne;

        let err = h.client.get_database_hash().await.unwrap_err();
        assert!(matches!(err, BrowserError::Core(CoreError::NonceMismatch)));
    }

    #[tokio::test]
    async fn test_bad_nonce_on_key_exchange_is_rejected() {
        let mut h = harness(5);
        h.peer.lock().script.nonce = NonceMode::SkipOne;
        let err = h.client.change_public_keys().await.unwrap_err();
        assert!(err.is_integrity_failure());
        assert!(!h.client.identity().has_peer_key());
    }

    #[tokio::test]
    async fn test_box_sealed_under_other_nonce_fails_authentication() {
        let mut h = harness(6);
        h.client.change_public_keys().await.unwrap();
        h.peer.lock().script.nonce = NonceMode::Mislabeled;

        let err = h.client.get_database_hash().await.unwrap_err();
        assert!(matches!(err, BrowserError::Core(CoreError::AuthenticationFailed)));
        assert!(err.is_crypto_error());
        assert_eq!(h.client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_two_byte_frame_triggers_exactly_one_extra_receive() {
        let mut h = harness(7);
        h.client.change_public_keys().await.unwrap();
        let before = h.handle.receive_calls();

        h.peer.lock().script.stray_prefix = true;
        h.client.get_database_hash().await.unwrap();
        assert_eq!(h.handle.receive_calls() - before, 2);
        assert_eq!(h.handle.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_database_locked_during_request_is_skipped() {
        let mut h = harness(8);
        h.client.change_public_keys().await.unwrap();

        h.peer.lock().script.locked_first = true;
        let totp = h.client.get_totp("0b1c").await.unwrap();
        assert_eq!(totp.totp.as_deref(), Some("123456"));
        assert_eq!(h.handle.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_notification_is_delivered() {
        let mut h = harness(9);
        h.handle.inject(br#"{"action":"database-locked"}"#.to_vec());
        h.handle.inject(br#"{"action":"database-unlocked"}"#.to_vec());

        let timeout = Some(Duration::from_millis(10));
        assert_eq!(
            h.client.poll_notification(timeout).await.unwrap(),
            Some(Notification::DatabaseLocked)
        );
        assert_eq!(
            h.client.poll_notification(timeout).await.unwrap(),
            Some(Notification::DatabaseUnlocked)
        );
        assert_eq!(h.client.poll_notification(timeout).await.unwrap(), None);

        h.handle.inject(br#"{"action":"get-totp"}"#.to_vec());
        assert!(h.client.poll_notification(timeout).await.unwrap_err().is_protocol_error());
    }

    #[tokio::test]
    async fn test_lock_database_reply_is_not_opened() {
        let mut h = associated(10).await;
        let ack = h.client.lock_database().await.unwrap();
        assert_eq!(ack.status.success.as_deref(), Some("true"));
        assert_eq!(h.client.state(), ClientState::Associated);

        // The request itself was encrypted and reached the peer.
        assert!(matches!(
            h.peer.lock().last_request(),
            Some(RequestPayload::LockDatabase(_))
        ));
    }

    #[tokio::test]
    async fn test_associate_registers_keys_and_returns_record() {
        let mut h = associated(11).await;
        assert_eq!(h.client.state(), ClientState::Associated);

        let record = h.client.identity().association_record().unwrap();
        assert_eq!(record.association_id, "fake-association-1");

        let peer = h.peer.lock();
        let Some(RequestPayload::Associate(request)) = peer.requests.first() else {
            panic!("no associate request recorded");
        };
        assert_eq!(&request.key, h.client.identity().public_key());
        assert_eq!(&request.id_key, h.client.identity().id_public_key());
        drop(peer);

        h.client.test_associate().await.unwrap();
        assert_eq!(h.client.state(), ClientState::Active);
    }

    #[tokio::test]
    async fn test_denied_association_is_distinct() {
        let mut h = harness(12);
        h.client.change_public_keys().await.unwrap();
        h.peer.lock().script.deny_association = true;

        let err = h.client.associate().await.unwrap_err();
        assert!(matches!(err, BrowserError::AssociationDenied { code: Some(6), .. }));
        assert_eq!(h.client.state(), ClientState::KeysExchanged);
        assert!(h.client.identity().association_id().is_none());
    }

    #[tokio::test]
    async fn test_unknown_stored_association_is_rejected() {
        let mut h = harness(13);
        h.client.change_public_keys().await.unwrap();
        assert!(h.client.test_associate().await.unwrap_err().is_state_error());

        let stale = AssociationRecord {
            id_key: h.peer.lock().public_key().to_base64(),
            association_id: "revoked".to_string(),
        };
        h.client.restore_association(&stale).unwrap();

        let err = h.client.test_associate().await.unwrap_err();
        assert!(matches!(err, BrowserError::AssociationRejected { code: Some(8), .. }));
        assert_ne!(h.client.state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_logins_use_association_key() {
        let mut h = associated(14).await;
        let logins = h
            .client
            .get_logins("https://example.org", Some("https://example.org/login"), false)
            .await
            .unwrap();
        assert_eq!(logins.count, Some(1));
        assert_eq!(logins.entries[0].password, "hunter2");

        let peer = h.peer.lock();
        let Some(RequestPayload::GetLogins(request)) = peer.last_request() else {
            panic!("no get-logins request recorded");
        };
        assert_eq!(request.keys[0].id, "fake-association-1");
        assert_eq!(&request.keys[0].key, h.client.identity().id_public_key());
    }

    #[tokio::test]
    async fn test_logins_without_association_fail_locally() {
        let mut h = harness(15);
        h.client.change_public_keys().await.unwrap();
        let sent = h.handle.sent_count();
        assert!(h.client.get_logins("https://example.org", None, false).await.unwrap_err().is_state_error());
        assert!(h
            .client
            .set_login(SetLoginRequest::default())
            .await
            .unwrap_err()
            .is_state_error());
        assert_eq!(h.handle.sent_count(), sent);
    }

    #[tokio::test]
    async fn test_set_login_carries_association_id() {
        let mut h = associated(16).await;
        let request = SetLoginRequest {
            url: "https://example.org".to_string(),
            login: "bob".to_string(),
            password: "s3cret".to_string(),
            ..SetLoginRequest::default()
        };
        h.client.set_login(request).await.unwrap();

        let peer = h.peer.lock();
        let Some(RequestPayload::SetLogin(seen)) = peer.last_request() else {
            panic!("no set-login request recorded");
        };
        assert_eq!(seen.id, "fake-association-1");
        assert_eq!(seen.login, "bob");
    }

    #[tokio::test]
    async fn test_remote_error_keeps_session_open() {
        let mut h = associated(17).await;
        let err = h.client.get_totp("missing").await.unwrap_err();
        assert!(matches!(
            err,
            BrowserError::Core(CoreError::Remote { code: Some(15), .. })
        ));
        assert_eq!(h.client.state(), ClientState::Associated);

        assert!(h.client.get_totp("0b1c").await.is_ok());
    }

    #[tokio::test]
    async fn test_generate_password_sends_request_id() {
        let mut h = associated(18).await;
        let generated = h.client.generate_password().await.unwrap();
        assert_eq!(generated.password.as_deref(), Some("correct horse battery staple"));

        let sent = h.handle.take_sent();
        let envelope = Envelope::parse(sent.last().unwrap()).unwrap();
        let envelope_id = envelope.request_id.clone().unwrap();
        assert_eq!(envelope_id.len(), 8);

        let peer = h.peer.lock();
        let Some(RequestPayload::GeneratePassword(request)) = peer.last_request() else {
            panic!("no generate-password request recorded");
        };
        assert_eq!(request.request_id.as_deref(), Some(envelope_id.as_str()));
    }

    #[tokio::test]
    async fn test_groups_and_new_group() {
        let mut h = associated(19).await;
        let groups = h.client.get_database_groups().await.unwrap();
        let paths: Vec<String> = groups.groups.groups[0]
            .flatten()
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(paths, ["Root", "Root/Web"]);

        let created = h.client.create_new_group("Root/Shop").await.unwrap();
        assert_eq!(created.name.as_deref(), Some("Root/Shop"));
    }

    #[tokio::test]
    async fn test_timeout_is_surfaced_not_retried() {
        let mut client = {
            let mut rng = StdRng::seed_from_u64(20);
            let identity = Identity::generate(ClientId::generate(&mut rng), &mut rng);
            ProtocolClient::new(MockConnection::new(), identity, Box::new(rng)).with_options(
                ClientOptions {
                    receive_timeout: Some(Duration::from_millis(10)),
                    ..ClientOptions::default()
                },
            )
        };
        let err = client.change_public_keys().await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(client.state(), ClientState::New);
    }

    #[tokio::test]
    async fn test_closed_client_refuses_everything() {
        let mut h = harness(21);
        h.client.close().await.unwrap();
        assert_eq!(h.client.state(), ClientState::Closed);
        assert!(h.client.change_public_keys().await.unwrap_err().is_state_error());
        assert!(h.client.connect("/tmp/x").await.unwrap_err().is_state_error());
    }
}
