//! Linux tap and macvtap management through `ip(8)`.

use std::path::Path;

use vmrig_shared::errors::{VmrigError, VmrigResult};

use super::{NetController, TapPolicy, interface_index};
use crate::runtime::types::MacvtapMode;
use crate::vmm::{LaunchOutcome, ProcessLauncher};

pub struct LinuxNetController {
    launcher: ProcessLauncher,
}

impl LinuxNetController {
    pub fn new(launcher: ProcessLauncher) -> Self {
        Self { launcher }
    }

    fn ip(&self, args: &[&str]) -> VmrigResult<()> {
        tracing::debug!(args = ?args, "Running ip");
        match self.launcher.run_capture("ip", args)? {
            LaunchOutcome::Success(_) => Ok(()),
            LaunchOutcome::Failure(output) => Err(VmrigError::Network(format!(
                "ip {} failed: {}",
                args.join(" "),
                output.trim_end()
            ))),
        }
    }
}

impl NetController for LinuxNetController {
    fn exists(&self, name: &str) -> bool {
        interface_index(name).is_some()
    }

    fn index(&self, name: &str) -> Option<u32> {
        interface_index(name)
    }

    /// macvtap devices get a character device named after their index.
    fn is_macvtap(&self, name: &str) -> bool {
        interface_index(name)
            .is_some_and(|idx| Path::new(&format!("/dev/tap{}", idx)).exists())
    }

    fn create_tap(&self, name: &str) -> VmrigResult<()> {
        self.ip(&["tuntap", "add", "dev", name, "mode", "tap"])?;
        self.ip(&["link", "set", name, "up"])?;
        tracing::info!(iface = %name, "Created tap interface");
        Ok(())
    }

    fn create_macvtap(
        &self,
        name: &str,
        parent: &str,
        mac: &str,
        mode: MacvtapMode,
    ) -> VmrigResult<()> {
        let mode = mode.ip_mode().ok_or_else(|| {
            VmrigError::InvalidState(format!("{} is not configured as macvtap", name))
        })?;

        self.ip(&[
            "link", "add", "link", parent, "name", name, "address", mac, "type", "macvtap",
            "mode", mode,
        ])?;
        self.ip(&["link", "set", name, "up"])?;
        tracing::info!(iface = %name, parent = %parent, mode, "Created macvtap interface");
        Ok(())
    }

    fn delete_iface(&self, name: &str) -> VmrigResult<()> {
        self.ip(&["link", "delete", name])?;
        tracing::info!(iface = %name, "Deleted interface");
        Ok(())
    }

    fn delete_tap(&self, name: &str) -> VmrigResult<()> {
        self.ip(&["tuntap", "del", "dev", name, "mode", "tap"])?;
        tracing::info!(iface = %name, "Deleted tap interface");
        Ok(())
    }

    fn set_ipv4(&self, name: &str, addr: &str) -> VmrigResult<()> {
        self.ip(&["addr", "add", addr, "dev", name])
    }

    fn set_altname(&self, name: &str, altname: &str) -> VmrigResult<()> {
        self.ip(&["link", "property", "add", "dev", name, "altname", altname])
    }

    fn tap_policy(&self) -> TapPolicy {
        TapPolicy::Precreate
    }

    fn supports_macvtap(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_is_not_macvtap() {
        let net = LinuxNetController::new(ProcessLauncher::default());
        assert!(net.exists("lo"));
        assert!(net.index("lo").is_some());
        assert!(!net.is_macvtap("lo"));
    }

    #[test]
    fn test_unknown_interface() {
        let net = LinuxNetController::new(ProcessLauncher::default());
        assert!(!net.exists("vmrig-nope0"));
        assert_eq!(net.index("vmrig-nope0"), None);
    }
}
