//! Companion-app availability probing.
//!
//! Whether the companion app is installed, running, and approved is
//! platform- and product-specific; the supervisor only needs the answers.
//! Each check maps to one gate in the connection pass, in the order the
//! supervisor asks them.

/// Result of the installation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallationState {
    /// The companion app is not installed
    NotInstalled,
    /// Installed, but its protocol version is unsupported
    IncompatibleVersion,
    /// Installed and compatible
    Installed,
}

/// Probe for the companion app's availability and approvals.
pub trait VaultAppProbe: Send {
    /// Is the companion app installed, and at a compatible version?
    fn installation_state(&self) -> InstallationState;

    /// Is the companion process currently running?
    fn is_running(&self) -> bool;

    /// Has the OS granted access to the companion app's sandbox container?
    fn is_container_access_approved(&self) -> bool;

    /// Has the user approved this integration inside the companion app?
    fn is_integration_approved(&self) -> bool;
}
