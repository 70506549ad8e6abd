// ============================================
// File: crates/kpxc-browser/src/testing.rs
// ============================================
//! In-test KeePassXC stand-in.
//!
//! `FakeKeePassXc` answers envelopes the way KeePassXC does: it learns the
//! client key on `change-public-keys`, opens every request with its own
//! session key, answers from canned data and seals the answer under the
//! request nonce plus one. A `Script` bends those rules for negative tests.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Map;

use kpxc_common::ClientId;
use kpxc_core::protocol::{
    AssociateResponse, CreateNewGroupResponse, GeneratePasswordResponse, GetDatabaseGroupsResponse,
    GetDatabaseHashResponse, GetLoginsResponse, GetTotpResponse, GroupNode, GroupTree, LoginEntry,
    ResponseStatus, SetLoginResponse, TestAssociateResponse,
};
use kpxc_core::{Action, BoxPublicKey, Envelope, Identity, Nonce, RequestPayload, ResponsePayload};
use kpxc_transport::MockConnection;

pub(crate) const DATABASE_HASH: &str = "29234e32274a32276e25666a42";
pub(crate) const SERVER_VERSION: &str = "2.7.9";

/// Nonce the fake puts on its replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum NonceMode {
    /// Request nonce plus one.
    #[default]
    Successor,
    /// The request nonce itself, payload sealed under it.
    Same,
    /// Request nonce plus two, payload sealed under it.
    SkipOne,
    /// Claims plus one, but seals under plus two.
    Mislabeled,
}

/// Deviations from clean behavior, applied to every following reply.
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    pub nonce: NonceMode,
    pub stray_prefix: bool,
    pub locked_first: bool,
    pub deny_association: bool,
}

pub(crate) struct FakeKeePassXc {
    identity: Identity,
    pub script: Script,
    /// Registered `(association id, id key)` pairs.
    pub associations: Vec<(String, BoxPublicKey)>,
    /// Every decrypted request, in order.
    pub requests: Vec<RequestPayload>,
    /// Session key announced by the client in `change-public-keys`.
    pub client_key: Option<BoxPublicKey>,
}

impl FakeKeePassXc {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let client_id = ClientId::generate(&mut rng);
        Self {
            identity: Identity::generate(client_id, &mut rng),
            script: Script::default(),
            associations: Vec::new(),
            requests: Vec::new(),
            client_key: None,
        }
    }

    pub fn shared(seed: u64) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::new(seed)))
    }

    /// A mock connection answered by `peer`.
    pub fn connection(peer: &Arc<Mutex<Self>>) -> MockConnection {
        let peer = Arc::clone(peer);
        MockConnection::with_responder(move |frame| peer.lock().handle(frame))
    }

    pub fn public_key(&self) -> BoxPublicKey {
        *self.identity.public_key()
    }

    pub fn last_request(&self) -> Option<&RequestPayload> {
        self.requests.last()
    }

    /// Answers one request with the frames KeePassXC would write.
    pub fn handle(&mut self, raw: &[u8]) -> Vec<Vec<u8>> {
        let request = Envelope::parse(raw).expect("fake peer got a malformed envelope");
        let action = request.action().expect("fake peer got an unknown action");
        let nonce = request.require_nonce().expect("fake peer got no nonce");

        let (claimed, sealing) = match self.script.nonce {
            NonceMode::Successor => (nonce.increment(), nonce.increment()),
            NonceMode::Same => (nonce, nonce),
            NonceMode::SkipOne => (nonce.increment().increment(), nonce.increment().increment()),
            NonceMode::Mislabeled => (nonce.increment(), nonce.increment().increment()),
        };

        let reply = match action {
            Action::ChangePublicKeys => {
                let key = request.public_key.as_deref().expect("no public key");
                self.identity.set_peer_public_key(key).expect("bad client key");
                self.client_key = self.identity.peer_public_key().copied();
                let mut reply =
                    Envelope::response(action.as_str(), &claimed).with_public_key(self.identity.public_key());
                reply.success = Some("true".to_string());
                reply.version = Some(SERVER_VERSION.to_string());
                reply
            }
            Action::LockDatabase => {
                self.open_request(action, &request, &nonce);
                // Acknowledged in clear; the message is deliberately not a box.
                let mut reply = Envelope::response(action.as_str(), &claimed);
                reply.success = Some("true".to_string());
                reply.message = Some("bm90IGEgYm94".to_string());
                reply
            }
            _ => self.encrypted_reply(action, &request, &nonce, &claimed, &sealing),
        };

        let mut frames = Vec::new();
        if self.script.stray_prefix {
            frames.push(b"{}".to_vec());
        }
        if self.script.locked_first {
            frames.push(br#"{"action":"database-locked"}"#.to_vec());
        }
        frames.push(reply.to_bytes().expect("reply serializes"));
        frames
    }

    fn open_request(&mut self, action: Action, request: &Envelope, nonce: &Nonce) -> Option<RequestPayload> {
        let sealed = request.message()?;
        let plaintext = self.identity.open(nonce, sealed).ok()?;
        let payload = RequestPayload::decode(action, &plaintext).expect("undecodable request payload");
        self.requests.push(payload.clone());
        Some(payload)
    }

    fn encrypted_reply(
        &mut self,
        action: Action,
        request: &Envelope,
        nonce: &Nonce,
        claimed: &Nonce,
        sealing: &Nonce,
    ) -> Envelope {
        let Some(payload) = self.open_request(action, request, nonce) else {
            return Envelope::error_reply(action.as_str(), "Cannot decrypt message", 4);
        };
        let mut response = match self.answer(payload) {
            Ok(response) => response,
            Err((message, code)) => return Envelope::error_reply(action.as_str(), message, code),
        };

        let status = response.status_mut();
        status.success = Some("true".to_string());
        status.version = Some(SERVER_VERSION.to_string());
        status.nonce = Some(claimed.to_base64());
        status.hash = Some(DATABASE_HASH.to_string());

        let json = response.to_json().expect("response serializes");
        let mut reply = Envelope::response(action.as_str(), claimed);
        reply.message = Some(self.identity.seal(sealing, &json).expect("seal"));
        reply
    }

    fn answer(&mut self, payload: RequestPayload) -> Result<ResponsePayload, (&'static str, i64)> {
        let ok = ResponseStatus::ok;
        let response = match payload {
            RequestPayload::GetDatabaseHash(_) => GetDatabaseHashResponse::default().into(),
            RequestPayload::Associate(request) => {
                if self.script.deny_association {
                    return Err(("Action cancelled or denied", 6));
                }
                let id = format!("fake-association-{}", self.associations.len() + 1);
                self.associations.push((id.clone(), request.id_key));
                AssociateResponse {
                    status: ok(),
                    id: Some(id),
                    extra: Map::new(),
                }
                .into()
            }
            RequestPayload::TestAssociate(request) => {
                if !self.is_associated(&request.id, &request.key) {
                    return Err(("Association failed", 8));
                }
                TestAssociateResponse {
                    status: ok(),
                    id: Some(request.id),
                    extra: Map::new(),
                }
                .into()
            }
            RequestPayload::GeneratePassword(_) => GeneratePasswordResponse {
                password: Some("correct horse battery staple".to_string()),
                ..GeneratePasswordResponse::default()
            }
            .into(),
            RequestPayload::GetLogins(request) => {
                if !request.keys.iter().any(|k| self.is_associated(&k.id, &k.key)) {
                    return Err(("Association failed", 8));
                }
                let entry = LoginEntry {
                    login: "alice".to_string(),
                    name: "Example".to_string(),
                    password: "hunter2".to_string(),
                    uuid: "0b1c".to_string(),
                    ..LoginEntry::default()
                };
                GetLoginsResponse {
                    count: Some(1),
                    entries: vec![entry],
                    ..GetLoginsResponse::default()
                }
                .into()
            }
            RequestPayload::SetLogin(_) => SetLoginResponse::default().into(),
            RequestPayload::LockDatabase(_) => unreachable!("lock-database is answered in clear"),
            RequestPayload::GetDatabaseGroups(_) => {
                let web = GroupNode {
                    name: "Web".to_string(),
                    uuid: "w".to_string(),
                    ..GroupNode::default()
                };
                let root = GroupNode {
                    name: "Root".to_string(),
                    uuid: "r".to_string(),
                    children: vec![web],
                    ..GroupNode::default()
                };
                GetDatabaseGroupsResponse {
                    groups: GroupTree { groups: vec![root] },
                    ..GetDatabaseGroupsResponse::default()
                }
                .into()
            }
            RequestPayload::CreateNewGroup(request) => CreateNewGroupResponse {
                name: Some(request.group_name),
                uuid: Some("new-group".to_string()),
                ..CreateNewGroupResponse::default()
            }
            .into(),
            RequestPayload::GetTotp(request) => {
                if request.uuid == "missing" {
                    return Err(("No logins found", 15));
                }
                GetTotpResponse {
                    totp: Some("123456".to_string()),
                    ..GetTotpResponse::default()
                }
                .into()
            }
        };
        Ok(response)
    }

    fn is_associated(&self, id: &str, key: &BoxPublicKey) -> bool {
        self.associations
            .iter()
            .any(|(known_id, known_key)| known_id == id && known_key == key)
    }
}
