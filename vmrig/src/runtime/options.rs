//! Runtime configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vmrig_shared::errors::{VmrigError, VmrigResult};

use crate::runtime::constants::{dirs as dir_names, envs, filenames};

/// Options for a [`VmrigRuntime`](crate::runtime::VmrigRuntime).
///
/// Every field has a default, so a JSON file only needs the keys it wants
/// to change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VmrigOptions {
    /// Root of database, logs and (by default) VM directories.
    pub home_dir: PathBuf,
    /// Directory holding one sub-directory per VM. Relative paths are
    /// resolved against `home_dir`.
    pub vm_dir: PathBuf,
    /// Install prefix of QEMU; binaries live in `<prefix>/bin`.
    pub qemu_prefix: PathBuf,
    /// Bind VNC/SPICE on all addresses instead of loopback.
    pub listen_any: bool,
    /// Write hypervisor failure output to the last-error log.
    pub log_last_error: bool,
    /// Override for the last-error log location.
    pub last_error_path: Option<PathBuf>,
    /// Enable SPICE for newly created VMs.
    pub spice_default: bool,
}

impl Default for VmrigOptions {
    fn default() -> Self {
        let home_dir = std::env::var_os(envs::VMRIG_HOME)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".vmrig")
            });

        Self {
            home_dir,
            vm_dir: PathBuf::from(dir_names::VMS),
            qemu_prefix: PathBuf::from("/usr"),
            listen_any: false,
            log_last_error: true,
            last_error_path: None,
            spice_default: false,
        }
    }
}

impl VmrigOptions {
    /// Load options from a JSON file, filling missing keys with defaults.
    pub fn load(path: &Path) -> VmrigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VmrigError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&raw)
            .map_err(|e| VmrigError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    /// VM root with relative paths resolved against the home directory.
    pub fn resolved_vm_dir(&self) -> PathBuf {
        if self.vm_dir.is_absolute() {
            self.vm_dir.clone()
        } else {
            self.home_dir.join(&self.vm_dir)
        }
    }

    /// Last-error log path, `None` when logging is disabled.
    pub fn resolved_last_error_path(&self) -> Option<PathBuf> {
        if !self.log_last_error {
            return None;
        }
        Some(self.last_error_path.clone().unwrap_or_else(|| {
            self.home_dir
                .join(dir_names::LOGS)
                .join(filenames::LAST_ERROR_LOG)
        }))
    }
}
