//! Wire envelopes for the native-messaging channel.
//!
//! Two request forms exist: a plaintext handshake request and an
//! encrypted-command request whose body is the string
//! `2.<ivBase64>|<dataBase64>|<macBase64>`. Responses mirror requests with
//! `payload` or `encryptedPayload` populated, plus a bare `command` tag on
//! unsolicited messages.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::command::ResponsePayload;
use super::{CIPHER_VERSION, PROTOCOL_VERSION};

/// Commands understood across the channel.
///
/// The first five tag requests (and their decrypted responses); the last
/// two arrive only as unsolicited out-of-band messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultCommand {
    /// Initial key exchange
    #[serde(rename = "handshake")]
    Handshake,
    /// Vault status query
    #[serde(rename = "status")]
    Status,
    /// Credential lookup by URI
    #[serde(rename = "credentialRetrieval")]
    CredentialRetrieval,
    /// Credential creation
    #[serde(rename = "credentialCreate")]
    CredentialCreate,
    /// Credential update
    #[serde(rename = "credentialUpdate")]
    CredentialUpdate,
    /// Companion app became reachable (unsolicited)
    #[serde(rename = "connected")]
    Connected,
    /// Companion app went away (unsolicited)
    #[serde(rename = "disconnected")]
    Disconnected,
}

/// Unique token correlating a request with its eventual response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a random id
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Handshake request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakePayload {
    /// Our ephemeral public key, base64 SPKI DER
    pub public_key: String,
    /// Name the companion app shows the user during approval
    pub application_name: String,
}

/// Outbound request envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Correlation id
    pub message_id: MessageId,
    /// Protocol version
    pub version: u32,
    /// Command tag, present only on plaintext requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<VaultCommand>,
    /// Handshake payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<HandshakePayload>,
    /// Encrypted command string, `2.<iv>|<data>|<mac>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_command: Option<String>,
}

impl RequestEnvelope {
    /// Build a handshake request
    pub fn handshake(message_id: MessageId, public_key: String, application_name: String) -> Self {
        Self {
            message_id,
            version: PROTOCOL_VERSION,
            command: Some(VaultCommand::Handshake),
            payload: Some(HandshakePayload {
                public_key,
                application_name,
            }),
            encrypted_command: None,
        }
    }

    /// Build an encrypted-command request
    pub fn encrypted_command(message_id: MessageId, encrypted_command: String) -> Self {
        Self {
            message_id,
            version: PROTOCOL_VERSION,
            command: None,
            payload: None,
            encrypted_command: Some(encrypted_command),
        }
    }

    /// Serialize for the transport
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Inbound response envelope.
///
/// Everything is optional: correlated responses carry `messageId` plus
/// `payload` or `encryptedPayload`; unsolicited messages carry only
/// `command`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// Correlation id of the request this answers
    pub message_id: Option<MessageId>,
    /// Protocol version
    pub version: Option<u32>,
    /// Command tag on unsolicited messages
    pub command: Option<VaultCommand>,
    /// Plaintext payload (handshake results, top-level errors)
    pub payload: Option<ResponsePayload>,
    /// Encrypted payload fields
    pub encrypted_payload: Option<EncryptedPayloadFields>,
}

impl ResponseEnvelope {
    /// Parse an inbound frame
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// The three base64 fields of an encrypted response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct EncryptedPayloadFields {
    /// Ciphertext, base64
    pub data: Option<String>,
    /// Initialization vector, base64
    pub iv: Option<String>,
    /// HMAC tag, base64
    pub mac: Option<String>,
}

/// Errors from encrypted-command string handling
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlobError {
    /// Missing or unsupported cipher-version prefix
    #[error("Unsupported cipher version")]
    UnsupportedVersion,
    /// The string does not have the `<iv>|<data>|<mac>` shape
    #[error("Malformed encrypted command string")]
    Malformed,
    /// A segment was not valid base64
    #[error("Invalid base64 in encrypted command string")]
    InvalidBase64,
}

/// The raw parts of an encrypted command, convertible to and from the
/// `2.<ivBase64>|<dataBase64>|<macBase64>` wire string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    /// Initialization vector
    pub iv: Vec<u8>,
    /// Ciphertext
    pub data: Vec<u8>,
    /// HMAC tag
    pub mac: Vec<u8>,
}

impl EncryptedBlob {
    /// Format as the wire string
    pub fn encode(&self) -> String {
        format!(
            "{}.{}|{}|{}",
            CIPHER_VERSION,
            BASE64.encode(&self.iv),
            BASE64.encode(&self.data),
            BASE64.encode(&self.mac)
        )
    }

    /// Parse a wire string back into its parts
    pub fn decode(s: &str) -> Result<Self, BlobError> {
        let (version, rest) = s.split_once('.').ok_or(BlobError::UnsupportedVersion)?;
        if version != CIPHER_VERSION {
            return Err(BlobError::UnsupportedVersion);
        }

        let mut segments = rest.split('|');
        let iv = segments.next().ok_or(BlobError::Malformed)?;
        let data = segments.next().ok_or(BlobError::Malformed)?;
        let mac = segments.next().ok_or(BlobError::Malformed)?;
        if segments.next().is_some() {
            return Err(BlobError::Malformed);
        }

        Ok(Self {
            iv: BASE64.decode(iv).map_err(|_| BlobError::InvalidBase64)?,
            data: BASE64.decode(data).map_err(|_| BlobError::InvalidBase64)?,
            mac: BASE64.decode(mac).map_err(|_| BlobError::InvalidBase64)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_request_shape() {
        let envelope = RequestEnvelope::handshake(
            MessageId::from("id-1"),
            "cHVibGljLWtleQ==".to_string(),
            "TestApp".to_string(),
        );
        let json: serde_json::Value =
            serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();

        assert_eq!(json["messageId"], "id-1");
        assert_eq!(json["version"], 1);
        assert_eq!(json["command"], "handshake");
        assert_eq!(json["payload"]["publicKey"], "cHVibGljLWtleQ==");
        assert_eq!(json["payload"]["applicationName"], "TestApp");
        assert!(json.get("encryptedCommand").is_none());
    }

    #[test]
    fn test_encrypted_command_request_shape() {
        let blob = EncryptedBlob {
            iv: vec![1; 16],
            data: vec![2; 32],
            mac: vec![3; 32],
        };
        let envelope = RequestEnvelope::encrypted_command(MessageId::from("id-2"), blob.encode());
        let json: serde_json::Value =
            serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();

        assert_eq!(json["messageId"], "id-2");
        assert!(json.get("command").is_none());
        assert!(json.get("payload").is_none());
        let command = json["encryptedCommand"].as_str().unwrap();
        assert!(command.starts_with("2."));
        assert_eq!(command.matches('|').count(), 2);
    }

    #[test]
    fn test_blob_encode_decode_roundtrip() {
        let blob = EncryptedBlob {
            iv: (0..16).collect(),
            data: (0..48).collect(),
            mac: (0..32).collect(),
        };

        let decoded = EncryptedBlob::decode(&blob.encode()).unwrap();
        assert_eq!(decoded, blob);
    }

    #[test]
    fn test_blob_decode_rejects_malformed() {
        assert_eq!(
            EncryptedBlob::decode("no-dot-here"),
            Err(BlobError::UnsupportedVersion)
        );
        assert_eq!(
            EncryptedBlob::decode("9.aa|bb|cc"),
            Err(BlobError::UnsupportedVersion)
        );
        assert_eq!(EncryptedBlob::decode("2.onlyone"), Err(BlobError::Malformed));
        assert_eq!(
            EncryptedBlob::decode("2.aa|bb|cc|dd"),
            Err(BlobError::Malformed)
        );
        assert_eq!(
            EncryptedBlob::decode("2.!!|bb|cc"),
            Err(BlobError::InvalidBase64)
        );
    }

    #[test]
    fn test_unsolicited_response_parse() {
        let envelope = ResponseEnvelope::from_bytes(br#"{"command":"connected"}"#).unwrap();
        assert_eq!(envelope.command, Some(VaultCommand::Connected));
        assert!(envelope.message_id.is_none());
    }

    #[test]
    fn test_correlated_encrypted_response_parse() {
        let envelope = ResponseEnvelope::from_bytes(
            br#"{"messageId":"id-3","version":1,"encryptedPayload":{"data":"ZGF0YQ==","iv":"aXY=","mac":"bWFj"}}"#,
        )
        .unwrap();

        assert_eq!(envelope.message_id, Some(MessageId::from("id-3")));
        let enc = envelope.encrypted_payload.unwrap();
        assert_eq!(enc.data.as_deref(), Some("ZGF0YQ=="));
        assert_eq!(enc.iv.as_deref(), Some("aXY="));
        assert_eq!(enc.mac.as_deref(), Some("bWFj"));
    }

    #[test]
    fn test_garbage_frame_fails_parse() {
        assert!(ResponseEnvelope::from_bytes(b"not json").is_err());
        assert!(ResponseEnvelope::from_bytes(br#"{"command":"who-knows"}"#).is_err());
    }

    #[test]
    fn test_message_id_randomness() {
        let a = MessageId::random();
        let b = MessageId::random();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }
}
