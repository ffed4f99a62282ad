//! Host network devices for VM interfaces.
//!
//! [`NetController`] is the per-platform capability (query, create and
//! delete tap/macvtap devices). [`NetDeviceManager`] reconciles one
//! interface record against it before a launch.

mod lifecycle;
pub mod mac;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(not(target_os = "linux"))]
mod bsd;

use vmrig_shared::errors::VmrigResult;

use crate::runtime::types::MacvtapMode;
use crate::vmm::ProcessLauncher;

pub use lifecycle::{NetDeviceManager, NetdevBinding};

/// What to do with a plain tap before the hypervisor starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapPolicy {
    /// Create it up front so address and alternate name can be applied.
    Precreate,
    /// Remove any leftover; the hypervisor creates it from `ifname=`.
    LeaveToHypervisor,
}

/// Host interface operations needed by the launch path.
pub trait NetController {
    fn exists(&self, name: &str) -> bool;

    /// Kernel interface index.
    fn index(&self, name: &str) -> Option<u32>;

    fn is_macvtap(&self, name: &str) -> bool;

    fn create_tap(&self, name: &str) -> VmrigResult<()>;

    fn create_macvtap(
        &self,
        name: &str,
        parent: &str,
        mac: &str,
        mode: MacvtapMode,
    ) -> VmrigResult<()>;

    /// Delete an interface of any type.
    fn delete_iface(&self, name: &str) -> VmrigResult<()>;

    /// Delete a plain tap.
    fn delete_tap(&self, name: &str) -> VmrigResult<()>;

    fn set_ipv4(&self, name: &str, addr: &str) -> VmrigResult<()>;

    fn set_altname(&self, name: &str, altname: &str) -> VmrigResult<()>;

    fn tap_policy(&self) -> TapPolicy;

    fn supports_macvtap(&self) -> bool;
}

/// Controller for the platform this binary was built for.
pub fn default_controller(launcher: ProcessLauncher) -> Box<dyn NetController> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxNetController::new(launcher))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Box::new(bsd::BsdNetController::new(launcher))
    }
}

/// Shared by the platform controllers.
fn interface_index(name: &str) -> Option<u32> {
    nix::net::if_::if_nametoindex(name).ok()
}
