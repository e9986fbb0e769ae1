//! Credential records exchanged with the vault.

use std::fmt;

use crate::protocol::PayloadItem;

/// One login credential.
///
/// Built by the caller for create/update operations, or reconstructed from
/// a decrypted retrieval response. Storage is the vault's responsibility;
/// this type has no persistence of its own.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Vault account the credential belongs to
    pub account_id: String,
    /// Vault-assigned id, `None` until the vault creates the entry
    pub credential_id: Option<String>,
    /// Display name of the entry
    pub display_name: String,
    /// Login username
    pub username: Option<String>,
    /// Login password
    pub secret: Option<String>,
    /// Domain the credential applies to
    pub domain: String,
}

impl Credential {
    /// Rebuild a credential from a decrypted response item.
    ///
    /// Returns `None` if any mandatory field (account id, credential id,
    /// display name) is missing; retrieval drops such items individually
    /// instead of failing the batch.
    pub fn from_payload_item(item: &PayloadItem, domain: &str) -> Option<Self> {
        let account_id = item.user_id.clone()?;
        let credential_id = item.credential_id.clone()?;
        let display_name = item.name.clone()?;

        Some(Self {
            account_id,
            credential_id: Some(credential_id),
            display_name,
            username: item.user_name.clone(),
            secret: item.password.clone(),
            domain: domain.to_string(),
        })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("credential_id", &self.credential_id)
            .field("display_name", &self.display_name)
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("domain", &self.domain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_item() -> PayloadItem {
        PayloadItem {
            user_id: Some("account-1".to_string()),
            credential_id: Some("cred-1".to_string()),
            name: Some("Example Login".to_string()),
            user_name: Some("alice".to_string()),
            password: Some("hunter2".to_string()),
            ..PayloadItem::default()
        }
    }

    #[test]
    fn test_from_complete_item() {
        let credential = Credential::from_payload_item(&full_item(), "example.com").unwrap();

        assert_eq!(credential.account_id, "account-1");
        assert_eq!(credential.credential_id.as_deref(), Some("cred-1"));
        assert_eq!(credential.display_name, "Example Login");
        assert_eq!(credential.username.as_deref(), Some("alice"));
        assert_eq!(credential.secret.as_deref(), Some("hunter2"));
        assert_eq!(credential.domain, "example.com");
    }

    #[test]
    fn test_missing_mandatory_fields_drop_item() {
        for strip in [
            |item: &mut PayloadItem| item.user_id = None,
            |item: &mut PayloadItem| item.credential_id = None,
            |item: &mut PayloadItem| item.name = None,
        ] {
            let mut item = full_item();
            strip(&mut item);
            assert!(Credential::from_payload_item(&item, "example.com").is_none());
        }
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let mut item = full_item();
        item.user_name = None;
        item.password = None;

        let credential = Credential::from_payload_item(&item, "example.com").unwrap();
        assert!(credential.username.is_none());
        assert!(credential.secret.is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::from_payload_item(&full_item(), "example.com").unwrap();
        let debug = format!("{:?}", credential);

        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }
}
