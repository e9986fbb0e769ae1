//! Inner command payloads carried inside the encrypted envelope.
//!
//! These types are what the cipher actually protects: a command tag plus a
//! command-specific field set. They serialize to the camelCase JSON the
//! companion app expects.

use serde::{Deserialize, Serialize};

use super::VaultCommand;

/// A command as it exists before encryption / after decryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedCommand {
    /// Command tag
    pub command: VaultCommand,
    /// Command-specific fields, absent for parameterless commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<CommandPayload>,
}

impl EncryptedCommand {
    /// Build a command with an optional payload
    pub fn new(command: VaultCommand, payload: Option<CommandPayload>) -> Self {
        Self { command, payload }
    }

    /// Serialize to the plaintext handed to the cipher
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Command-specific request fields.
///
/// One struct covers all four commands; absent fields are omitted from the
/// wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPayload {
    /// Target URI for retrieval, or the credential's domain for writes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Vault account the credential belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Login username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Login password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Display name of the credential entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Vault-assigned credential id, required for updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
}

/// A decrypted response: command tag plus payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InnerResponse {
    /// Command this responds to
    pub command: VaultCommand,
    /// Response payload
    pub payload: Option<ResponsePayload>,
}

impl InnerResponse {
    /// Parse a decrypted response payload
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Response payload: either a list of items or a single item.
///
/// The decode is an explicit two-step attempt (array first, then single
/// item) rather than exception-driven probing; anything that is neither
/// fails the parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// A list of payload items (status vaults, retrieved credentials)
    Array(Vec<PayloadItem>),
    /// A single item (write acknowledgements, errors, handshake result)
    Item(Box<PayloadItem>),
}

/// One response item with every field the companion app may populate.
///
/// All fields are optional on the wire; which ones are meaningful depends
/// on the command being answered.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadItem {
    /// Vault identifier (status responses)
    pub id: Option<String>,
    /// Account email (status responses)
    pub email: Option<String>,
    /// Vault lock state, or the `"success"` marker on write responses
    pub status: Option<String>,
    /// Whether this vault entry is the active one
    pub active: Option<bool>,
    /// Owning account id (credential items)
    pub user_id: Option<String>,
    /// Vault-assigned credential id (credential items)
    pub credential_id: Option<String>,
    /// Credential display name
    pub name: Option<String>,
    /// Login username
    pub user_name: Option<String>,
    /// Login password
    pub password: Option<String>,
    /// Error string reported by the companion app
    pub error: Option<String>,
    /// Wrapped shared key (handshake responses)
    pub shared_key: Option<String>,
}
