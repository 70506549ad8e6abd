// ============================================
// File: crates/kpxc-core/src/protocol/payload.rs
// ============================================
//! # Typed Payload Catalog
//!
//! ## Creation Reason
//! The decrypted `message` of every encrypted action is a JSON record whose
//! shape depends on the action. This module gives each action a request
//! and a response record and gathers them in two closed enums, so dispatch
//! on the action name is exhaustive and checked at compile time.
//!
//! ## Main Functionality
//! - Per-action records (`AssociateRequest`, `GetLoginsResponse`, ...)
//! - `RequestPayload` / `ResponsePayload`: one variant per encrypted action
//! - `ActionRequest`: ties a request record to its action and response type
//! - `ActionResponse`: access to the shared `ResponseStatus`
//!
//! ## Payload Rules
//! ```text
//! request  JSON = record fields + "action": <name>   (injected on encode)
//! response JSON = ResponseStatus fields + record fields + extra
//! ```
//! Every record keeps unknown fields in `extra`; the interceptor relays what
//! it decoded and must not drop what it does not understand.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Adding an action = one line in `action_catalog!` plus its two records
//! - `ResponseStatus` must stay flattened BEFORE `extra`, otherwise `extra`
//!   swallows the status fields
//!
//! ## Last Modified
//! v0.1.0 - Initial payload catalog

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{lenient, Action};
use crate::crypto::BoxPublicKey;
use crate::error::{CoreError, Result};

// ============================================
// Traits
// ============================================

/// A typed request record bound to its action and response record.
pub trait ActionRequest: Serialize + DeserializeOwned + Into<RequestPayload> {
    /// Action this record is sent under.
    const ACTION: Action;

    /// Record the server answers with.
    type Response: ActionResponse;

    /// Encodes the record with its `action` field injected.
    ///
    /// # Errors
    /// `MalformedPayload` if serialization fails.
    fn to_json(&self) -> Result<Vec<u8>> {
        encode_request(Self::ACTION, self)
    }
}

/// A typed response record.
pub trait ActionResponse: Serialize + DeserializeOwned + Into<ResponsePayload> {
    /// Status fields shared by every response.
    fn status(&self) -> &ResponseStatus;

    /// Decodes a decrypted response payload.
    ///
    /// # Errors
    /// `MalformedPayload` if the JSON does not fit the record.
    fn from_json(action: Action, json: &[u8]) -> Result<Self> {
        serde_json::from_slice(json).map_err(|e| CoreError::malformed_payload(action.as_str(), e))
    }
}

fn encode_request<T: Serialize>(action: Action, record: &T) -> Result<Vec<u8>> {
    let mut value =
        serde_json::to_value(record).map_err(|e| CoreError::malformed_payload(action.as_str(), e))?;
    if let Value::Object(map) = &mut value {
        map.insert("action".to_string(), Value::String(action.as_str().to_string()));
    }
    serde_json::to_vec(&value).map_err(|e| CoreError::malformed_payload(action.as_str(), e))
}

fn decode_request<T: DeserializeOwned>(action: Action, json: &[u8]) -> Result<T> {
    let mut value: Value =
        serde_json::from_slice(json).map_err(|e| CoreError::malformed_payload(action.as_str(), e))?;
    if let Value::Object(map) = &mut value {
        if let Some(Value::String(claimed)) = map.remove("action") {
            if claimed != action.as_str() {
                return Err(CoreError::unexpected(action.as_str(), claimed));
            }
        }
    }
    serde_json::from_value(value).map_err(|e| CoreError::malformed_payload(action.as_str(), e))
}

fn no_payload(action: Action) -> CoreError {
    CoreError::malformed_payload(action.as_str(), "action carries no encrypted payload")
}

// ============================================
// Shared Records
// ============================================

/// Status fields every encrypted response carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseStatus {
    /// `"true"` on success.
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub success: Option<String>,
    /// Server version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Echo of the envelope nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Database hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl ResponseStatus {
    /// A status with `success: "true"`.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: Some("true".to_string()),
            ..Self::default()
        }
    }

    /// Fails with `Remote` if `success` is present and not `"true"`.
    ///
    /// # Errors
    /// See above.
    pub fn check(&self) -> Result<()> {
        match self.success.as_deref() {
            Some(s) if !s.is_empty() && s != "true" => {
                Err(CoreError::remote(format!("server reported success={s}"), None))
            }
            _ => Ok(()),
        }
    }
}

/// One (association id, id key) pair used to select a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationKey {
    /// Association id.
    pub id: String,
    /// Id public key registered under that association.
    pub key: BoxPublicKey,
}

/// A login returned by `get-logins`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginEntry {
    /// User name.
    #[serde(default)]
    pub login: String,
    /// Entry title.
    #[serde(default)]
    pub name: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// Entry uuid.
    #[serde(default)]
    pub uuid: String,
    /// `"true"` if the entry is expired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired: Option<String>,
    /// Extra `KPH:` string fields.
    #[serde(
        rename = "stringFields",
        default,
        deserialize_with = "lenient::nullable"
    )]
    pub string_fields: Vec<Map<String, Value>>,
    /// Unmodeled fields (`totp`, `group`, `skipAutoSubmit`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A node of the group tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupNode {
    /// Group name.
    #[serde(default)]
    pub name: String,
    /// Group uuid.
    #[serde(default)]
    pub uuid: String,
    /// Sub-groups.
    #[serde(default, deserialize_with = "lenient::nullable")]
    pub children: Vec<GroupNode>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GroupNode {
    /// Pre-order list of `(path, node)` pairs, path joined with `/`.
    #[must_use]
    pub fn flatten(&self) -> Vec<(String, &GroupNode)> {
        let mut out = Vec::new();
        self.collect_into("", &mut out);
        out
    }

    fn collect_into<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a GroupNode)>) {
        let path = if prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{prefix}/{}", self.name)
        };
        out.push((path.clone(), self));
        for child in &self.children {
            child.collect_into(&path, out);
        }
    }
}

/// The `groups` object of `get-database-groups`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupTree {
    /// Root groups.
    #[serde(default, deserialize_with = "lenient::nullable")]
    pub groups: Vec<GroupNode>,
}

// ============================================
// Request Records
// ============================================

/// `get-databasehash` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetDatabaseHashRequest {
    /// Unmodeled fields (`connectedKeys`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `associate` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociateRequest {
    /// Session public key of the requester.
    pub key: BoxPublicKey,
    /// Id public key to register.
    #[serde(rename = "idKey")]
    pub id_key: BoxPublicKey,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `test-associate` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestAssociateRequest {
    /// Association id to check.
    pub id: String,
    /// Id public key registered under `id`.
    pub key: BoxPublicKey,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `generate-password` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratePasswordRequest {
    /// Correlation id, mirrored from the envelope.
    #[serde(rename = "requestID", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `get-logins` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetLoginsRequest {
    /// Page URL.
    pub url: String,
    /// Form action URL.
    #[serde(rename = "submitUrl", default, skip_serializing_if = "Option::is_none")]
    pub submit_url: Option<String>,
    /// HTTP basic auth request flag.
    #[serde(
        rename = "httpAuth",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub http_auth: Option<String>,
    /// Associations to search under.
    #[serde(default, deserialize_with = "lenient::nullable")]
    pub keys: Vec<AssociationKey>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `set-login` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetLoginRequest {
    /// Page URL.
    pub url: String,
    /// Form action URL.
    #[serde(rename = "submitUrl", default)]
    pub submit_url: String,
    /// Association id the entry is stored under.
    #[serde(default)]
    pub id: String,
    /// User name.
    #[serde(default)]
    pub login: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// Target group name.
    #[serde(default)]
    pub group: String,
    /// Target group uuid.
    #[serde(rename = "groupUuid", default)]
    pub group_uuid: String,
    /// Uuid of the entry to update, empty to create.
    #[serde(default)]
    pub uuid: String,
    /// `"true"` to fetch the site favicon.
    #[serde(
        rename = "downloadFavicon",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_favicon: Option<String>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `lock-database` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockDatabaseRequest {
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `get-database-groups` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetDatabaseGroupsRequest {
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `create-new-group` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateNewGroupRequest {
    /// Group path, `/` separated.
    #[serde(rename = "groupName")]
    pub group_name: String,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `get-totp` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetTotpRequest {
    /// Entry uuid.
    pub uuid: String,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================
// Response Records
// ============================================

/// `get-databasehash` response (`status.hash` holds the hash).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetDatabaseHashResponse {
    /// Status fields.
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `associate` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssociateResponse {
    /// Status fields.
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Assigned association id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `test-associate` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestAssociateResponse {
    /// Status fields.
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Association id that was checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `generate-password` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratePasswordResponse {
    /// Status fields.
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Generated password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `get-logins` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetLoginsResponse {
    /// Status fields.
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Number of entries.
    #[serde(
        default,
        deserialize_with = "lenient::count",
        skip_serializing_if = "Option::is_none"
    )]
    pub count: Option<u64>,
    /// Matching logins.
    #[serde(default, deserialize_with = "lenient::nullable")]
    pub entries: Vec<LoginEntry>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `set-login` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetLoginResponse {
    /// Status fields.
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Number of entries touched.
    #[serde(
        default,
        deserialize_with = "lenient::count",
        skip_serializing_if = "Option::is_none"
    )]
    pub count: Option<u64>,
    /// Touched entries, usually empty.
    #[serde(default, deserialize_with = "lenient::nullable")]
    pub entries: Vec<LoginEntry>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `lock-database` response. KeePassXC acknowledges in clear, so this record
/// only appears when a peer chooses to seal it anyway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockDatabaseResponse {
    /// Status fields.
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `get-database-groups` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetDatabaseGroupsResponse {
    /// Status fields.
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Name of the default group for new entries.
    #[serde(rename = "defaultGroup", default, skip_serializing_if = "Option::is_none")]
    pub default_group: Option<String>,
    /// Whether the default group is always used.
    #[serde(
        rename = "defaultGroupAlwaysAllow",
        default,
        deserialize_with = "lenient::boolean",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_group_always_allow: Option<bool>,
    /// Group tree.
    #[serde(default)]
    pub groups: GroupTree,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `create-new-group` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateNewGroupResponse {
    /// Status fields.
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Name of the created (or existing) group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Its uuid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `get-totp` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetTotpResponse {
    /// Status fields.
    #[serde(flatten)]
    pub status: ResponseStatus,
    /// Current TOTP code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp: Option<String>,
    /// Unmodeled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================
// Closed Payload Enums
// ============================================

macro_rules! action_catalog {
    ($($variant:ident => $request:ident, $response:ident;)+) => {
        /// Decrypted request payload, one variant per encrypted action.
        #[derive(Debug, Clone, PartialEq)]
        pub enum RequestPayload {
            $(
                #[doc = concat!("Payload of `", stringify!($variant), "`.")]
                $variant($request),
            )+
        }

        /// Decrypted response payload, one variant per encrypted action.
        #[derive(Debug, Clone, PartialEq)]
        pub enum ResponsePayload {
            $(
                #[doc = concat!("Payload of `", stringify!($variant), "`.")]
                $variant($response),
            )+
        }

        $(
            impl ActionRequest for $request {
                const ACTION: Action = Action::$variant;
                type Response = $response;
            }

            impl ActionResponse for $response {
                fn status(&self) -> &ResponseStatus {
                    &self.status
                }
            }

            impl From<$request> for RequestPayload {
                fn from(record: $request) -> Self {
                    Self::$variant(record)
                }
            }

            impl From<$response> for ResponsePayload {
                fn from(record: $response) -> Self {
                    Self::$variant(record)
                }
            }
        )+

        impl RequestPayload {
            /// Decodes a decrypted request for `action`.
            ///
            /// # Errors
            /// `MalformedPayload` if the JSON does not fit, or the action has
            /// no encrypted payload; `UnexpectedAction` if the inner `action`
            /// disagrees with the envelope.
            pub fn decode(action: Action, json: &[u8]) -> Result<Self> {
                match action {
                    $(Action::$variant => decode_request::<$request>(action, json).map(Self::$variant),)+
                    other => Err(no_payload(other)),
                }
            }

            /// Action of this payload.
            #[must_use]
            pub const fn action(&self) -> Action {
                match self {
                    $(Self::$variant(_) => Action::$variant,)+
                }
            }

            /// Encodes with the `action` field injected.
            ///
            /// # Errors
            /// `MalformedPayload` if serialization fails.
            pub fn to_json(&self) -> Result<Vec<u8>> {
                match self {
                    $(Self::$variant(record) => record.to_json(),)+
                }
            }
        }

        impl ResponsePayload {
            /// Decodes a decrypted response for `action`.
            ///
            /// # Errors
            /// `MalformedPayload` if the JSON does not fit, or the action has
            /// no encrypted payload.
            pub fn decode(action: Action, json: &[u8]) -> Result<Self> {
                match action {
                    $(Action::$variant => $response::from_json(action, json).map(Self::$variant),)+
                    other => Err(no_payload(other)),
                }
            }

            /// Action of this payload.
            #[must_use]
            pub const fn action(&self) -> Action {
                match self {
                    $(Self::$variant(_) => Action::$variant,)+
                }
            }

            /// Shared status fields.
            #[must_use]
            pub fn status(&self) -> &ResponseStatus {
                match self {
                    $(Self::$variant(record) => &record.status,)+
                }
            }

            /// Mutable access to the shared status fields.
            pub fn status_mut(&mut self) -> &mut ResponseStatus {
                match self {
                    $(Self::$variant(record) => &mut record.status,)+
                }
            }

            /// Encodes the payload as sent by the server.
            ///
            /// # Errors
            /// `MalformedPayload` if serialization fails.
            pub fn to_json(&self) -> Result<Vec<u8>> {
                let encoded = match self {
                    $(Self::$variant(record) => serde_json::to_vec(record),)+
                };
                encoded.map_err(|e| CoreError::malformed_payload(self.action().as_str(), e))
            }
        }
    };
}

action_catalog! {
    GetDatabaseHash => GetDatabaseHashRequest, GetDatabaseHashResponse;
    Associate => AssociateRequest, AssociateResponse;
    TestAssociate => TestAssociateRequest, TestAssociateResponse;
    GeneratePassword => GeneratePasswordRequest, GeneratePasswordResponse;
    GetLogins => GetLoginsRequest, GetLoginsResponse;
    SetLogin => SetLoginRequest, SetLoginResponse;
    LockDatabase => LockDatabaseRequest, LockDatabaseResponse;
    GetDatabaseGroups => GetDatabaseGroupsRequest, GetDatabaseGroupsResponse;
    CreateNewGroup => CreateNewGroupRequest, CreateNewGroupResponse;
    GetTotp => GetTotpRequest, GetTotpResponse;
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SessionKeyPair;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn key(seed: u64) -> BoxPublicKey {
        *SessionKeyPair::generate(&mut StdRng::seed_from_u64(seed)).public_key()
    }

    #[test]
    fn test_request_encoding_injects_action() {
        let request = AssociateRequest {
            key: key(1),
            id_key: key(2),
            extra: Map::new(),
        };
        let value: Value = serde_json::from_slice(&request.to_json().unwrap()).unwrap();
        assert_eq!(value["action"], "associate");
        assert_eq!(value["key"], key(1).to_base64());
        assert_eq!(value["idKey"], key(2).to_base64());
    }

    #[test]
    fn test_request_decode_dispatches_by_action() {
        let raw = json!({
            "action": "get-logins",
            "url": "https://example.org",
            "keys": [{"id": "laptop", "key": key(3).to_base64()}],
            "triggerUnlock": "true"
        });
        let payload =
            RequestPayload::decode(Action::GetLogins, raw.to_string().as_bytes()).unwrap();
        assert_eq!(payload.action(), Action::GetLogins);

        let RequestPayload::GetLogins(request) = &payload else {
            panic!("wrong variant {payload:?}");
        };
        assert_eq!(request.keys[0].id, "laptop");
        assert_eq!(request.extra["triggerUnlock"], "true");
        assert!(!request.extra.contains_key("action"));

        let back: Value = serde_json::from_slice(&payload.to_json().unwrap()).unwrap();
        assert_eq!(back["action"], "get-logins");
        assert_eq!(back["triggerUnlock"], "true");
    }

    #[test]
    fn test_request_decode_rejects_action_disagreement() {
        let raw = br#"{"action":"get-totp","uuid":"x"}"#;
        assert!(matches!(
            RequestPayload::decode(Action::GetLogins, raw),
            Err(CoreError::UnexpectedAction { .. })
        ));
    }

    #[test]
    fn test_actions_without_payload_are_rejected() {
        for action in [
            Action::ChangePublicKeys,
            Action::DatabaseLocked,
            Action::DatabaseUnlocked,
        ] {
            assert!(matches!(
                RequestPayload::decode(action, b"{}"),
                Err(CoreError::MalformedPayload { .. })
            ));
            assert!(ResponsePayload::decode(action, b"{}").is_err());
        }
    }

    #[test]
    fn test_response_status_is_flattened() {
        let raw = json!({
            "action": "get-logins",
            "count": "1",
            "entries": [{
                "login": "alice",
                "name": "Example",
                "password": "hunter2",
                "uuid": "abc",
                "stringFields": null,
                "totp": "123456"
            }],
            "hash": "29234e32274a32276e25666a42",
            "nonce": "zRuoyDBHmH2B2U0lswZ9wLh7zcGrPB5N",
            "success": "true",
            "version": "2.7.4"
        });
        let payload =
            ResponsePayload::decode(Action::GetLogins, raw.to_string().as_bytes()).unwrap();
        assert_eq!(payload.status().success.as_deref(), Some("true"));
        assert_eq!(payload.status().version.as_deref(), Some("2.7.4"));
        assert!(payload.status().check().is_ok());

        let ResponsePayload::GetLogins(response) = payload else {
            panic!("wrong variant");
        };
        assert_eq!(response.count, Some(1));
        assert_eq!(response.entries[0].login, "alice");
        assert_eq!(response.entries[0].extra["totp"], "123456");
        assert!(response.entries[0].string_fields.is_empty());
        assert!(!response.extra.contains_key("success"));
        assert_eq!(response.extra["action"], "get-logins");
    }

    #[test]
    fn test_unsuccessful_status_is_remote_error() {
        let response =
            GetTotpResponse::from_json(Action::GetTotp, br#"{"success":"false","totp":""}"#)
                .unwrap();
        assert!(matches!(
            response.status().check(),
            Err(CoreError::Remote { .. })
        ));
    }

    #[test]
    fn test_group_tree_paths() {
        let raw = json!({
            "defaultGroup": "",
            "defaultGroupAlwaysAllow": false,
            "groups": {"groups": [{
                "name": "Root",
                "uuid": "r",
                "children": [
                    {"name": "Web", "uuid": "w", "children": [{"name": "Shop", "uuid": "s", "children": []}]},
                    {"name": "Mail", "uuid": "m", "children": null}
                ]
            }]},
            "success": "true"
        });
        let response =
            GetDatabaseGroupsResponse::from_json(Action::GetDatabaseGroups, raw.to_string().as_bytes())
                .unwrap();
        assert_eq!(response.default_group_always_allow, Some(false));

        let paths: Vec<String> = response.groups.groups[0]
            .flatten()
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(paths, ["Root", "Root/Web", "Root/Web/Shop", "Root/Mail"]);
    }

    #[test]
    fn test_malformed_key_in_request_is_payload_error() {
        let raw = br#"{"action":"associate","key":"bad","idKey":"bad"}"#;
        assert!(matches!(
            RequestPayload::decode(Action::Associate, raw),
            Err(CoreError::MalformedPayload { .. })
        ));
    }
}
