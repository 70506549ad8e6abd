// ============================================
// File: crates/kpxc-browser/src/handlers/mitm.rs
// ============================================
//! # Intercepting Handler
//!
//! ## Creation Reason
//! Sits between a browser extension and KeePassXC, presenting its own
//! session key to both, so every encrypted payload can be opened, inspected
//! or rewritten, and re-sealed.
//!
//! ## Main Functionality
//! - `Interceptor`: one client leg, one KeePassXC leg, one shared key pair
//! - Key capture and substitution on `change-public-keys`
//! - Payload re-sealing with an independent nonce on each leg
//! - Hook invocation on every decrypted payload
//!
//! ## Two Legs
//! ```text
//!            nonce N                       nonce M (fresh)
//! client ───────────────► Interceptor ───────────────────► KeePassXC
//!   peer = own key          │      │         peer = own key
//!                           │      │
//! client ◄─────────────── Interceptor ◄─────────────────── KeePassXC
//!            nonce N+1      (status.nonce      nonce M+1
//!                            rewritten)
//! ```
//!
//! ## Exchange Steps
//! ```text
//! change-public-keys:
//!   1. Learn client key, replace it with own key
//!   2. Forward under fresh nonce M, verify M+1 on the reply
//!   3. Learn KeePassXC key, replace it with own key, answer with N+1
//!
//! encrypted action:
//!   1. Open with the client leg, decode
//!   2. associate: force `key` to own session key
//!   3. on_request, re-seal with the KeePassXC leg under fresh M
//!   4. Verify M+1; errors and clear acks are relayed with nonce N+1
//!   5. Open, on_response, set status.nonce = N+1, re-seal under N+1
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Each leg verifies its own successor nonce; the client still sees a
//!   correct N+1 both in the envelope and inside the decrypted status
//! - Any error closes the interceptor, there is no partial recovery
//! - Notifications from KeePassXC that arrive mid-exchange are dropped
//!
//! ## Last Modified
//! v0.1.0 - Initial interceptor

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use kpxc_common::ClientId;
use kpxc_core::protocol::BUF_SIZE;
use kpxc_core::{
    Action, CoreError, Envelope, Identity, Nonce, RandomSource, RequestPayload, ResponsePayload,
    SessionKeyPair,
};
use kpxc_transport::Connection;

use crate::error::{BrowserError, Result};
use crate::exchange::{receive_reply, verify_reply};
use crate::handlers::RequestHandler;
use crate::hooks::{InterceptContext, InterceptHook};

// ============================================
// InterceptorState
// ============================================

/// Interceptor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorState {
    /// Waiting for the client's `change-public-keys`.
    AwaitingKeys,
    /// Both legs keyed.
    Ready,
    /// Closed after an error.
    Closed,
}

// ============================================
// Interceptor
// ============================================

/// Man-in-the-middle request handler.
pub struct Interceptor<C, H> {
    upstream: C,
    /// Leg facing the browser extension.
    client_leg: Identity,
    /// Leg facing KeePassXC; its id key is the one KeePassXC learns.
    server_leg: Identity,
    hook: H,
    rng: Box<dyn RandomSource>,
    state: InterceptorState,
    max_message_size: usize,
    timeout: Option<Duration>,
}

impl<C: Connection, H: InterceptHook> Interceptor<C, H> {
    /// Creates an interceptor over a connected KeePassXC connection.
    pub fn new(upstream: C, hook: H, mut rng: Box<dyn RandomSource>) -> Self {
        let client_id = ClientId::generate(&mut *rng);
        let session = SessionKeyPair::generate(&mut *rng);
        let client_leg = Identity::with_session_key(client_id.clone(), session.clone(), &mut *rng);
        let server_leg = Identity::with_session_key(client_id, session, &mut *rng);
        Self {
            upstream,
            client_leg,
            server_leg,
            hook,
            rng,
            state: InterceptorState::AwaitingKeys,
            max_message_size: BUF_SIZE,
            timeout: None,
        }
    }

    /// Sets the KeePassXC receive limits.
    #[must_use]
    pub fn with_limits(mut self, max_message_size: usize, timeout: Option<Duration>) -> Self {
        self.max_message_size = max_message_size;
        self.timeout = timeout;
        self
    }

    /// Keys presented to both sides.
    pub fn context(&self) -> InterceptContext {
        InterceptContext {
            session_key: *self.server_leg.public_key(),
            id_key: *self.server_leg.id_public_key(),
        }
    }

    /// Current state.
    pub const fn state(&self) -> InterceptorState {
        self.state
    }

    /// The installed hook.
    pub const fn hook(&self) -> &H {
        &self.hook
    }

    // ========================================
    // Dispatch
    // ========================================

    async fn dispatch(&mut self, raw: &[u8]) -> Result<Vec<u8>> {
        let request = Envelope::parse(raw)?;
        let action = request.action()?;
        if action.is_notification() {
            return Err(CoreError::unexpected("a request", request.action).into());
        }

        match (action, self.state) {
            (_, InterceptorState::Closed) => {
                Err(CoreError::invalid_state(action.as_str(), "an open interceptor").into())
            }
            (Action::ChangePublicKeys, _) => self.exchange_keys(request).await,
            (_, InterceptorState::AwaitingKeys) => {
                Err(CoreError::invalid_state(action.as_str(), "exchanged public keys").into())
            }
            (_, InterceptorState::Ready) => self.relay_encrypted(action, request).await,
        }
    }

    async fn exchange_keys(&mut self, mut request: Envelope) -> Result<Vec<u8>> {
        let action = Action::ChangePublicKeys;
        let client_nonce = request.require_nonce()?;
        let client_key = request
            .public_key
            .as_deref()
            .ok_or_else(|| CoreError::missing("publicKey"))?;
        self.client_leg.set_peer_public_key(client_key)?;

        let upstream_nonce = Nonce::random(&mut *self.rng);
        request.set_nonce(&upstream_nonce);
        request.public_key = Some(self.server_leg.export_public_key());

        let mut reply = self.forward(action, &request).await?;
        verify_reply(&upstream_nonce, action, &reply)?;
        if reply.has_error() || reply.is_unsuccessful() {
            warn!(error = ?reply.error, "KeePassXC refused key exchange, relaying");
            return relay_clear(reply, &client_nonce);
        }

        let server_key = reply
            .public_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| BrowserError::handshake_failed("reply carries no public key"))?;
        self.server_leg.set_peer_public_key(server_key)?;

        reply.public_key = Some(self.client_leg.export_public_key());
        reply.set_nonce(&client_nonce.increment());
        self.state = InterceptorState::Ready;
        info!(
            client_key = %peer_fingerprint(&self.client_leg),
            server_key = %peer_fingerprint(&self.server_leg),
            "Both legs keyed"
        );
        Ok(reply.to_bytes()?)
    }

    async fn relay_encrypted(&mut self, action: Action, mut request: Envelope) -> Result<Vec<u8>> {
        let client_nonce = request.require_nonce()?;
        let sealed = request
            .message()
            .ok_or_else(|| CoreError::malformed(format!("'{action}' request carries no message")))?;
        let plaintext = self.client_leg.open(&client_nonce, sealed)?;
        let mut payload = RequestPayload::decode(action, &plaintext)?;

        let ctx = self.context();
        if let RequestPayload::Associate(associate) = &mut payload {
            associate.key = ctx.session_key;
        }
        self.hook.on_request(&ctx, &mut payload)?;

        let upstream_nonce = Nonce::random(&mut *self.rng);
        request.set_nonce(&upstream_nonce);
        request.message = Some(self.server_leg.seal(&upstream_nonce, &payload.to_json()?)?);

        let mut reply = self.forward(action, &request).await?;
        let reply_nonce = verify_reply(&upstream_nonce, action, &reply)?;

        let relay_as_is =
            reply.has_error() || reply.is_unsuccessful() || !action.has_encrypted_response();
        let sealed = reply.message().map(str::to_string);
        let (reply_nonce, sealed) = match (reply_nonce, sealed) {
            (Some(nonce), Some(sealed)) if !relay_as_is => (nonce, sealed),
            _ => {
                debug!(action = %action, "Relaying clear reply");
                return relay_clear(reply, &client_nonce);
            }
        };

        let opened = self.server_leg.open(&reply_nonce, &sealed)?;
        let mut response = ResponsePayload::decode(action, &opened)?;
        self.hook.on_response(&ctx, &mut response)?;

        let downstream_nonce = client_nonce.increment();
        let status = response.status_mut();
        if status.nonce.is_some() {
            status.nonce = Some(downstream_nonce.to_base64());
        }
        reply.set_nonce(&downstream_nonce);
        reply.message = Some(self.client_leg.seal(&downstream_nonce, &response.to_json()?)?);
        debug!(action = %action, "Relayed encrypted exchange");
        Ok(reply.to_bytes()?)
    }

    async fn forward(&mut self, action: Action, request: &Envelope) -> Result<Envelope> {
        self.upstream.send(&request.to_bytes()?).await?;
        receive_reply(&mut self.upstream, action, self.max_message_size, self.timeout).await
    }

    async fn shutdown(&mut self) {
        self.state = InterceptorState::Closed;
        if let Err(e) = self.upstream.close().await {
            debug!(error = %e, "Upstream close failed");
        }
    }
}

#[async_trait]
impl<C: Connection, H: InterceptHook> RequestHandler for Interceptor<C, H> {
    async fn handle(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        let result = self.dispatch(request).await;
        if let Err(e) = &result {
            if self.state != InterceptorState::Closed {
                warn!(error = %e, "Interception failed, closing");
                self.shutdown().await;
            }
        }
        result
    }

    fn is_closed(&self) -> bool {
        self.state == InterceptorState::Closed
    }

    async fn close(&mut self) {
        if self.state != InterceptorState::Closed {
            info!("Browser side gone, closing KeePassXC leg");
            self.shutdown().await;
        }
    }
}

/// Passes a reply on unopened, renumbered for the client leg.
fn relay_clear(mut reply: Envelope, client_nonce: &Nonce) -> Result<Vec<u8>> {
    if reply.nonce.is_some() {
        reply.set_nonce(&client_nonce.increment());
    }
    Ok(reply.to_bytes()?)
}

fn peer_fingerprint(leg: &Identity) -> String {
    leg.peer_public_key()
        .map_or_else(|| "-".to_string(), |key| key.fingerprint())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kpxc_transport::{MockConnection, MockHandle, StreamConnection};
    use parking_lot::Mutex;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::client::{ClientState, ProtocolClient};
    use crate::hooks::{IdKeySubstitution, PassthroughHook};
    use crate::server::Server;
    use crate::testing::{FakeKeePassXc, NonceMode};

    fn interceptor<H: InterceptHook>(
        peer: &Arc<Mutex<FakeKeePassXc>>,
        hook: H,
        seed: u64,
    ) -> (Interceptor<MockConnection, H>, MockHandle) {
        let upstream = FakeKeePassXc::connection(peer);
        let handle = upstream.handle();
        let rng = Box::new(StdRng::seed_from_u64(seed));
        (Interceptor::new(upstream, hook, rng), handle)
    }

    fn browser(seed: u64) -> (Identity, StdRng) {
        let mut rng = StdRng::seed_from_u64(seed);
        let identity = Identity::generate(ClientId::generate(&mut rng), &mut rng);
        (identity, rng)
    }

    /// Runs the browser half of `change-public-keys` against `mitm`.
    async fn key_exchange<H: InterceptHook>(
        mitm: &mut Interceptor<MockConnection, H>,
        browser: &mut Identity,
        rng: &mut StdRng,
    ) {
        let nonce = Nonce::random(rng);
        let request = Envelope::request(Action::ChangePublicKeys, browser.client_id(), &nonce)
            .with_public_key(browser.public_key());
        let reply = mitm.handle(&request.to_bytes().unwrap()).await.unwrap();
        let reply = Envelope::parse(&reply).unwrap();
        assert_eq!(reply.require_nonce().unwrap(), nonce.increment());
        browser
            .set_peer_public_key(reply.public_key.as_deref().unwrap())
            .unwrap();
    }

    #[tokio::test]
    async fn test_end_to_end_through_proxy_server() {
        let peer = FakeKeePassXc::shared(40);
        let (mitm, _) = interceptor(&peer, IdKeySubstitution::new(), 41);
        let ctx = mitm.context();

        let (client_side, proxy_side) = tokio::io::duplex(64 * 1024);
        let mut server = Server::new(StreamConnection::split(proxy_side), mitm);
        let serving = tokio::spawn(async move { server.serve().await });

        let (identity, rng) = browser(42);
        let browser_id_key = *identity.id_public_key();
        let mut client =
            ProtocolClient::new(StreamConnection::split(client_side), identity, Box::new(rng));

        client.change_public_keys().await.unwrap();
        assert_eq!(client.identity().peer_public_key(), Some(&ctx.session_key));

        client.associate().await.unwrap();
        client.test_associate().await.unwrap();
        assert_eq!(client.state(), ClientState::Active);

        let logins = client.get_logins("https://example.org", None, false).await.unwrap();
        assert_eq!(logins.entries[0].login, "alice");

        let hash = client.get_database_hash().await.unwrap();
        assert!(hash.status.hash.is_some());

        let err = client.get_totp("missing").await.unwrap_err();
        assert!(err.is_remote());
        assert!(client.get_totp("0b1c").await.is_ok());

        client.lock_database().await.unwrap();
        drop(client);

        let stats = serving.await.unwrap().unwrap();
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.requests, 8);

        let peer = peer.lock();
        assert_eq!(peer.client_key, Some(ctx.session_key));
        assert_eq!(peer.associations.len(), 1);
        assert_eq!(peer.associations[0].1, ctx.id_key);
        assert_ne!(peer.associations[0].1, browser_id_key);
    }

    #[tokio::test]
    async fn test_associate_session_key_is_forced() {
        let peer = FakeKeePassXc::shared(43);
        let (mut mitm, _) = interceptor(&peer, PassthroughHook, 44);
        let (mut browser, mut rng) = browser(45);
        key_exchange(&mut mitm, &mut browser, &mut rng).await;

        let nonce = Nonce::random(&mut rng);
        let payload = RequestPayload::Associate(kpxc_core::protocol::AssociateRequest {
            key: *browser.public_key(),
            id_key: *browser.id_public_key(),
            extra: serde_json::Map::new(),
        });
        let mut request = Envelope::request(Action::Associate, browser.client_id(), &nonce);
        request.message = Some(browser.seal(&nonce, &payload.to_json().unwrap()).unwrap());

        let reply = mitm.handle(&request.to_bytes().unwrap()).await.unwrap();
        let reply = Envelope::parse(&reply).unwrap();
        let reply_nonce = reply.require_nonce().unwrap();
        assert_eq!(reply_nonce, nonce.increment());

        let opened = browser.open(&reply_nonce, reply.message().unwrap()).unwrap();
        let response = ResponsePayload::decode(Action::Associate, &opened).unwrap();
        assert_eq!(response.status().nonce.as_deref(), Some(reply_nonce.to_base64().as_str()));

        let peer = peer.lock();
        let Some(RequestPayload::Associate(seen)) = peer.last_request() else {
            panic!("no associate request recorded");
        };
        assert_eq!(seen.key, mitm.context().session_key);
        // Without substitution the browser's id key goes through.
        assert_eq!(&seen.id_key, browser.id_public_key());
    }

    #[tokio::test]
    async fn test_encrypted_request_before_keys_closes() {
        let peer = FakeKeePassXc::shared(46);
        let (mut mitm, handle) = interceptor(&peer, PassthroughHook, 47);
        let (browser, mut rng) = browser(48);

        let nonce = Nonce::random(&mut rng);
        let request = Envelope::request(Action::GetDatabaseHash, browser.client_id(), &nonce);
        let err = mitm.handle(&request.to_bytes().unwrap()).await.unwrap_err();
        assert!(err.is_state_error());
        assert!(mitm.is_closed());
        assert!(!handle.is_connected());
        assert_eq!(handle.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_notification_as_request_is_rejected() {
        let peer = FakeKeePassXc::shared(49);
        let (mut mitm, _) = interceptor(&peer, PassthroughHook, 50);
        let err = mitm
            .handle(br#"{"action":"database-locked"}"#)
            .await
            .unwrap_err();
        assert!(err.is_protocol_error());
        assert_eq!(mitm.state(), InterceptorState::Closed);
    }

    #[tokio::test]
    async fn test_upstream_nonce_replay_is_caught() {
        let peer = FakeKeePassXc::shared(51);
        let (mut mitm, handle) = interceptor(&peer, PassthroughHook, 52);
        let (mut browser, mut rng) = browser(53);
        key_exchange(&mut mitm, &mut browser, &mut rng).await;

        peer.lock().script.nonce = NonceMode::Same;
        let nonce = Nonce::random(&mut rng);
        let payload = RequestPayload::GetDatabaseHash(Default::default());
        let mut request = Envelope::request(Action::GetDatabaseHash, browser.client_id(), &nonce);
        request.message = Some(browser.seal(&nonce, &payload.to_json().unwrap()).unwrap());

        let err = mitm.handle(&request.to_bytes().unwrap()).await.unwrap_err();
        assert!(err.is_integrity_failure());
        assert!(mitm.is_closed());
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_undecryptable_client_message_closes() {
        let peer = FakeKeePassXc::shared(54);
        let (mut mitm, handle) = interceptor(&peer, PassthroughHook, 55);
        let (mut browser, mut rng) = browser(56);
        key_exchange(&mut mitm, &mut browser, &mut rng).await;
        let sent_before = handle.sent_count();

        let nonce = Nonce::random(&mut rng);
        let mut request = Envelope::request(Action::GetTotp, browser.client_id(), &nonce);
        request.message = Some("AAAAAAAAAAAAAAAAAAAAAA==".to_string());

        let err = mitm.handle(&request.to_bytes().unwrap()).await.unwrap_err();
        assert!(err.is_crypto_error());
        assert!(mitm.is_closed());
        assert_eq!(handle.sent_count(), sent_before);
    }

    #[tokio::test]
    async fn test_browser_side_end_closes_keepassxc_leg() {
        let peer = FakeKeePassXc::shared(57);
        let (mut mitm, handle) = interceptor(&peer, PassthroughHook, 58);
        let (mut browser, mut rng) = browser(59);
        key_exchange(&mut mitm, &mut browser, &mut rng).await;
        assert_eq!(mitm.state(), InterceptorState::Ready);

        let mut server = Server::new(MockConnection::new(), mitm).with_limits(None, BUF_SIZE);
        let stats = server.serve().await.unwrap();

        assert_eq!(stats, crate::server::ServeStats::default());
        assert_eq!(server.handler().state(), InterceptorState::Closed);
        assert!(!handle.is_connected());
    }
}
