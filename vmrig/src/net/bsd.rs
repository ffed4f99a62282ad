//! BSD tap management through `ifconfig(8)`. macvtap does not exist here.

use vmrig_shared::errors::{VmrigError, VmrigResult};

use super::{NetController, TapPolicy, interface_index};
use crate::runtime::types::MacvtapMode;
use crate::vmm::{LaunchOutcome, ProcessLauncher};

pub struct BsdNetController {
    launcher: ProcessLauncher,
}

impl BsdNetController {
    pub fn new(launcher: ProcessLauncher) -> Self {
        Self { launcher }
    }

    fn ifconfig(&self, args: &[&str]) -> VmrigResult<()> {
        match self.launcher.run_capture("ifconfig", args)? {
            LaunchOutcome::Success(_) => Ok(()),
            LaunchOutcome::Failure(output) => Err(VmrigError::Network(format!(
                "ifconfig {} failed: {}",
                args.join(" "),
                output.trim_end()
            ))),
        }
    }
}

impl NetController for BsdNetController {
    fn exists(&self, name: &str) -> bool {
        interface_index(name).is_some()
    }

    fn index(&self, name: &str) -> Option<u32> {
        interface_index(name)
    }

    fn is_macvtap(&self, _name: &str) -> bool {
        false
    }

    fn create_tap(&self, name: &str) -> VmrigResult<()> {
        self.ifconfig(&[name, "create"])
    }

    fn create_macvtap(
        &self,
        name: &str,
        _parent: &str,
        _mac: &str,
        _mode: MacvtapMode,
    ) -> VmrigResult<()> {
        Err(VmrigError::Unsupported(format!(
            "macvtap is not available on this platform ({})",
            name
        )))
    }

    fn delete_iface(&self, name: &str) -> VmrigResult<()> {
        self.ifconfig(&[name, "destroy"])
    }

    fn delete_tap(&self, name: &str) -> VmrigResult<()> {
        self.ifconfig(&[name, "destroy"])?;
        tracing::info!(iface = %name, "Destroyed tap interface");
        Ok(())
    }

    fn set_ipv4(&self, name: &str, addr: &str) -> VmrigResult<()> {
        self.ifconfig(&[name, "inet", addr])
    }

    /// Stored as the interface description; BSD has no alternate names.
    fn set_altname(&self, name: &str, altname: &str) -> VmrigResult<()> {
        self.ifconfig(&[name, "description", altname])
    }

    fn tap_policy(&self) -> TapPolicy {
        TapPolicy::LeaveToHypervisor
    }

    fn supports_macvtap(&self) -> bool {
        false
    }
}
