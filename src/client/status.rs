//! Connection status state machine types.
//!
//! [`Status`] is the single source of truth for the connection lifecycle.
//! Exactly one value is live at a time; the supervisor owns it and
//! observers read it through a watch channel.
//!
//! | Status                        | Meaning                                     |
//! |-------------------------------|---------------------------------------------|
//! | `Disabled`                    | Integration switched off by the user        |
//! | `NotInstalled`                | Companion app missing                       |
//! | `IncompatibleVersion`         | Companion app too old for this protocol     |
//! | `NotRunning`                  | Installed but the process is not up         |
//! | `ContainerAccessNotApproved`  | OS sandbox access not granted               |
//! | `IntegrationNotApproved`      | Not approved inside the companion app       |
//! | `MissingHandshake`            | No shared key yet; handshake required       |
//! | `WaitingForHandshakeApproval` | Handshake sent, waiting on the user         |
//! | `HandshakeNotApproved`        | User rejected the handshake                 |
//! | `Connecting`                  | Launching the transport                     |
//! | `WaitingForStatusResponse`    | Session up, first status query in flight    |
//! | `Connected`                   | Vault reachable                             |
//! | `Error`                       | A failure the retry path is working on      |

/// Lock state of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Vault is unlocked and can serve credentials
    Unlocked,
    /// Vault is locked; the user must unlock it in the companion app
    Locked,
}

impl LockState {
    /// Parse the wire representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unlocked" => Some(LockState::Unlocked),
            "locked" => Some(LockState::Locked),
            _ => None,
        }
    }
}

/// One vault as reported by a status response.
///
/// An immutable snapshot, replaced wholesale on every status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vault {
    /// Vault identifier
    pub id: String,
    /// Account email
    pub email: String,
    /// Current lock state
    pub lock_state: LockState,
    /// Whether this is the active vault
    pub active: bool,
}

impl Vault {
    /// A copy of this vault with the lock state forced to locked
    pub fn locked(&self) -> Vault {
        Vault {
            lock_state: LockState::Locked,
            ..self.clone()
        }
    }

    /// Whether the vault is locked
    pub fn is_locked(&self) -> bool {
        self.lock_state == LockState::Locked
    }
}

/// Failure kinds carried by [`Status::Error`].
///
/// Every one of these is retried via the scheduled-retry path; the status
/// exists so observers can show the user the real cause meanwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusErrorKind {
    /// The companion transport failed to launch
    TransportLaunchFailed,
    /// The persisted shared key could not be installed
    SharedKeyInjectionFailed,
    /// The wrapped shared key failed to decrypt
    DecryptionOfSharedKeyFailed,
    /// Persisting the shared key failed
    StoringOfSharedKeyFailed,
    /// A status response had no single active vault
    NoActiveVault,
    /// A status response item was missing mandatory fields
    StatusParsingFailed,
    /// An inbound message could not be parsed
    ParsingFailed,
    /// A response failed MAC verification
    HmacMismatch,
    /// A response failed to decrypt
    DecryptionFailed,
    /// A command could not be built or sent
    SendingFailed,
}

/// Connection status, the authoritative lifecycle representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Integration disabled; requires explicit re-enable
    Disabled,
    /// Companion app not installed
    NotInstalled,
    /// Companion app protocol version unsupported
    IncompatibleVersion,
    /// Companion process not running
    NotRunning,
    /// OS sandbox container access not granted
    ContainerAccessNotApproved,
    /// Integration not approved inside the companion app
    IntegrationNotApproved,
    /// No shared key persisted; a handshake must be triggered explicitly
    MissingHandshake,
    /// Handshake sent, waiting for the user to approve it
    WaitingForHandshakeApproval,
    /// Handshake rejected; requires an explicit new handshake
    HandshakeNotApproved,
    /// Launching the transport
    Connecting,
    /// Transport up, waiting for the first status response
    WaitingForStatusResponse,
    /// Vault reachable
    Connected {
        /// The active vault
        vault: Vault,
    },
    /// A failure occurred; the retry path is active
    Error {
        /// What failed
        kind: StatusErrorKind,
    },
}

impl Status {
    /// Whether the client is connected to a vault
    pub fn is_connected(&self) -> bool {
        matches!(self, Status::Connected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_state_parse() {
        assert_eq!(LockState::parse("unlocked"), Some(LockState::Unlocked));
        assert_eq!(LockState::parse("locked"), Some(LockState::Locked));
        assert_eq!(LockState::parse("Locked"), None);
        assert_eq!(LockState::parse(""), None);
    }

    #[test]
    fn test_vault_locked_copy() {
        let vault = Vault {
            id: "v1".to_string(),
            email: "a@b.c".to_string(),
            lock_state: LockState::Unlocked,
            active: true,
        };

        let locked = vault.locked();
        assert!(locked.is_locked());
        assert_eq!(locked.id, vault.id);
        assert_eq!(locked.email, vault.email);
        // The original is untouched
        assert!(!vault.is_locked());
    }

    #[test]
    fn test_is_connected() {
        let vault = Vault {
            id: "v1".to_string(),
            email: "a@b.c".to_string(),
            lock_state: LockState::Unlocked,
            active: true,
        };

        assert!(Status::Connected { vault }.is_connected());
        assert!(!Status::Connecting.is_connected());
        assert!(!Status::Error {
            kind: StatusErrorKind::NoActiveVault
        }
        .is_connected());
    }
}
