//! Host USB devices for passthrough.

mod resolver;
mod sysfs;

use std::path::PathBuf;

use vmrig_shared::errors::VmrigResult;

pub use resolver::{UsbAddress, UsbResolver};
pub use sysfs::SysfsUsbEnumerator;

/// A USB device currently attached to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostUsbDevice {
    pub bus: u32,
    pub address: u32,
    /// Lowercase hex, as reported by the kernel.
    pub vendor_id: String,
    pub product_id: String,
    /// Where the serial can be read from.
    pub path: PathBuf,
}

/// Lists attached USB devices.
pub trait UsbEnumerator {
    fn list(&self) -> VmrigResult<Vec<HostUsbDevice>>;

    /// Serial number of `device`; `None` if it has none.
    ///
    /// Expensive: the device gets opened.
    fn serial(&self, device: &HostUsbDevice) -> VmrigResult<Option<String>>;
}
