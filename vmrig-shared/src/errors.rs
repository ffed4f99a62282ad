//! Error taxonomy for vmrig.
//!
//! Two families are kept apart:
//! - [`AbortReason`]: a precondition failed while building a launch plan.
//!   Nothing was spawned; the caller shows a short warning.
//! - Everything else in [`VmrigError`]: store, OS or hypervisor failures.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout vmrig.
pub type VmrigResult<T> = Result<T, VmrigError>;

/// Why a launch plan could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortReason {
    /// Install flag is set but no install source was configured.
    #[error("install source is not set")]
    InstallSourceMissing,

    /// The CD-ROM image configured for an installed VM does not exist.
    #[error("ISO image not found: {}", .0.display())]
    InstallSourceNotFound(PathBuf),

    /// Serial socket path already exists on disk.
    #[error("serial socket is already in use: {}", .0.display())]
    SocketInUse(PathBuf),

    /// Serial TTY path cannot be opened for reading.
    #[error("serial TTY is missing: {}", .0.display())]
    TtyMissing(PathBuf),

    /// Serial TTY path is not a terminal.
    #[error("serial TTY is not a terminal: {}", .0.display())]
    TtyInvalid(PathBuf),

    /// Interface requests macvtap but has no parent interface.
    #[error("macvtap parent interface is not set for {0}")]
    MacvtapParentNotSet(String),

    /// udev did not grant read/write access to the tap device in time.
    #[error("permission to {} was not granted in time", .0.display())]
    TapPermissionTimeout(PathBuf),
}

#[derive(Debug, Error)]
pub enum VmrigError {
    #[error("database error: {0}")]
    Database(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("usb error: {0}")]
    Usb(String),

    /// Spawning the hypervisor failed at the OS level (fork/exec).
    #[error("engine error: {0}")]
    Engine(String),

    /// The hypervisor ran but exited with a non-zero status.
    #[error("hypervisor exited with an error: {output}")]
    LaunchFailed { output: String },

    #[error("launch aborted: {0}")]
    Aborted(#[from] AbortReason),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VmrigError {
    /// True if this is a precondition abort rather than a failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, VmrigError::Aborted(_))
    }

    /// The abort reason, if any.
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            VmrigError::Aborted(reason) => Some(reason),
            _ => None,
        }
    }
}
