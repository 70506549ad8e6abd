// ============================================
// File: crates/kpxc-core/src/protocol/envelope.rs
// ============================================
//! # Message Envelope
//!
//! ## Creation Reason
//! The outer JSON object of every message. Only this layer is visible to
//! the transport; the typed payload lives base64-encoded and sealed in
//! `message`.
//!
//! ## Wire Format
//! ```json
//! {
//!   "action":    "get-logins",
//!   "nonce":     "<base64, 24 bytes>",
//!   "clientID":  "<client id>",
//!   "requestID": "12345678",          // optional
//!   "publicKey": "<base64, 32 bytes>", // change-public-keys only
//!   "message":   "<base64 ciphertext>",
//!   "success":   "true",               // responses
//!   "error":     "...",                // responses
//!   "errorCode": "6",                  // responses
//!   "version":   "2.7.4"               // responses
//! }
//! ```
//! Unknown fields are preserved in `extra` so a relaying proxy never drops
//! them.
//!
//! ## ⚠️ Important Note for Next Developer
//! - `action` stays a raw string here; typing it is the caller's decision
//!   (an interceptor must be able to relay envelopes it cannot type)
//! - Status checks follow the server's order: error fields first, then
//!   `success`, then the nonce
//!
//! ## Last Modified
//! v0.1.0 - Initial envelope definition

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use kpxc_common::{ClientId, RequestId};

use super::{lenient, Action};
use crate::crypto::{BoxPublicKey, Nonce};
use crate::error::{CoreError, Result};

/// Outer wire message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Action name.
    pub action: String,

    /// Base64 nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Clear client id.
    #[serde(rename = "clientID", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Correlation id for long-running actions.
    #[serde(rename = "requestID", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Clear public key (`change-public-keys` only).
    #[serde(rename = "publicKey", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Base64 sealed payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Ask the server to prompt for unlocking a locked database.
    #[serde(
        rename = "triggerUnlock",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub trigger_unlock: Option<String>,

    /// `"true"` on success.
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub success: Option<String>,

    /// Server error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Server error code, numeric but sent as a string.
    #[serde(
        rename = "errorCode",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_code: Option<String>,

    /// Server version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Fields this engine does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    // ========================================
    // Construction
    // ========================================

    /// Starts a request envelope.
    #[must_use]
    pub fn request(action: Action, client_id: &ClientId, nonce: &Nonce) -> Self {
        Self {
            action: action.as_str().to_string(),
            nonce: Some(nonce.to_base64()),
            client_id: Some(client_id.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Starts a response envelope carrying `nonce`.
    #[must_use]
    pub fn response(action: impl Into<String>, nonce: &Nonce) -> Self {
        Self {
            action: action.into(),
            nonce: Some(nonce.to_base64()),
            ..Self::default()
        }
    }

    /// Adds a request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: &RequestId) -> Self {
        self.request_id = Some(request_id.as_str().to_string());
        self
    }

    /// Adds a clear public key.
    #[must_use]
    pub fn with_public_key(mut self, key: &BoxPublicKey) -> Self {
        self.public_key = Some(key.to_base64());
        self
    }

    // ========================================
    // Codec
    // ========================================

    /// Parses an envelope from raw bytes.
    ///
    /// # Errors
    /// `MalformedEnvelope` if the bytes are not a JSON object with an
    /// `action` string.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let envelope: Self = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::malformed(format!("invalid envelope JSON: {e}")))?;
        if envelope.action.is_empty() {
            return Err(CoreError::malformed("empty action"));
        }
        Ok(envelope)
    }

    /// Serializes the envelope.
    ///
    /// # Errors
    /// `MalformedEnvelope` if an `extra` value cannot be serialized.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| CoreError::malformed(format!("cannot serialize envelope: {e}")))
    }

    // ========================================
    // Accessors
    // ========================================

    /// Types the action name.
    ///
    /// # Errors
    /// `UnknownAction` for names outside the catalog.
    pub fn action(&self) -> Result<Action> {
        self.action.parse()
    }

    /// Decodes the nonce, if present.
    ///
    /// # Errors
    /// `MalformedEnvelope` if the nonce is not 24 bytes of base64.
    pub fn nonce(&self) -> Result<Option<Nonce>> {
        self.nonce
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(Nonce::from_base64)
            .transpose()
    }

    /// Decodes the nonce, failing when it is absent.
    ///
    /// # Errors
    /// `MalformedEnvelope` if missing or malformed.
    pub fn require_nonce(&self) -> Result<Nonce> {
        self.nonce()?
            .ok_or_else(|| CoreError::malformed(format!("'{}' carries no nonce", self.action)))
    }

    /// Replaces the nonce.
    pub fn set_nonce(&mut self, nonce: &Nonce) {
        self.nonce = Some(nonce.to_base64());
    }

    /// Returns the sealed payload, ignoring an empty string.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.is_empty())
    }

    /// Returns `true` if the server reported an error through the clear fields.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
            || self.error_code.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Returns `true` if `success` is present with any value but `"true"`.
    #[must_use]
    pub fn is_unsuccessful(&self) -> bool {
        self.success
            .as_deref()
            .is_some_and(|s| !s.is_empty() && s != "true")
    }

    /// Checks the clear status fields of a response.
    ///
    /// # Errors
    /// `Remote` if `error`/`errorCode` is set or `success` is not `"true"`.
    pub fn check_status(&self) -> Result<()> {
        if self.has_error() {
            return Err(CoreError::remote(
                self.error.clone().unwrap_or_default(),
                self.error_code.as_deref().filter(|c| !c.is_empty()),
            ));
        }
        if self.is_unsuccessful() {
            return Err(CoreError::remote("request was not successful", None));
        }
        Ok(())
    }

    /// Builds an error reply in KeePassXC's shape.
    #[must_use]
    pub fn error_reply(action: impl Into<String>, message: impl Into<String>, code: i64) -> Self {
        Self {
            action: action.into(),
            error: Some(message.into()),
            error_code: Some(code.to_string()),
            ..Self::default()
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_request_omits_absent_fields() {
        let mut rng = StdRng::seed_from_u64(1);
        let client_id = ClientId::generate(&mut rng);
        let nonce = Nonce::random(&mut rng);

        let envelope = Envelope::request(Action::GetDatabaseHash, &client_id, &nonce);
        let json: Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object["action"], "get-databasehash");
        assert_eq!(object["clientID"], client_id.as_str());
        assert_eq!(object["nonce"], nonce.to_base64());
        assert!(!object.contains_key("message"));
        assert!(!object.contains_key("requestID"));
        assert!(!object.contains_key("publicKey"));
    }

    #[test]
    fn test_parse_keeps_unknown_fields() {
        let raw = br#"{"action":"get-logins","nonce":"","clientID":"c","keys":[1],"triggerUnlock":true}"#;
        let envelope = Envelope::parse(raw).unwrap();
        assert_eq!(envelope.action().unwrap(), Action::GetLogins);
        assert_eq!(envelope.trigger_unlock.as_deref(), Some("true"));
        assert_eq!(envelope.nonce().unwrap(), None);
        assert!(envelope.extra.contains_key("keys"));

        let back: Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(back["keys"], serde_json::json!([1]));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Envelope::parse(b"{}"),
            Err(CoreError::MalformedEnvelope { .. })
        ));
        assert!(matches!(
            Envelope::parse(b"[1,2]"),
            Err(CoreError::MalformedEnvelope { .. })
        ));
        let unknown = Envelope::parse(br#"{"action":"frobnicate"}"#).unwrap();
        assert!(matches!(unknown.action(), Err(CoreError::UnknownAction(_))));
    }

    #[test]
    fn test_status_error_fields_win() {
        let env = Envelope::parse(
            br#"{"action":"associate","error":"Action cancelled or denied","errorCode":6,"success":"true"}"#,
        )
        .unwrap();
        match env.check_status() {
            Err(CoreError::Remote { message, code }) => {
                assert_eq!(message, "Action cancelled or denied");
                assert_eq!(code, Some(6));
            }
            other => panic!("unexpected {other:?}"),
        }

        let odd = Envelope::parse(br#"{"action":"x","errorCode":"abc"}"#).unwrap();
        assert!(matches!(
            odd.check_status(),
            Err(CoreError::Remote { code: Some(-1), .. })
        ));
    }

    #[test]
    fn test_status_success_flag() {
        let ok = Envelope::parse(br#"{"action":"lock-database","success":true}"#).unwrap();
        assert!(ok.check_status().is_ok());

        let absent = Envelope::parse(br#"{"action":"lock-database"}"#).unwrap();
        assert!(absent.check_status().is_ok());

        let failed = Envelope::parse(br#"{"action":"lock-database","success":"false"}"#).unwrap();
        assert!(matches!(
            failed.check_status(),
            Err(CoreError::Remote { code: None, .. })
        ));
    }

    #[test]
    fn test_bad_nonce_is_malformed() {
        let env = Envelope::parse(br#"{"action":"get-totp","nonce":"AAAA"}"#).unwrap();
        assert!(matches!(env.nonce(), Err(CoreError::MalformedEnvelope { .. })));
        assert!(Envelope::parse(br#"{"action":"get-totp"}"#)
            .unwrap()
            .require_nonce()
            .is_err());
    }
}
