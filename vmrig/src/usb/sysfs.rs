//! USB enumeration from `/sys/bus/usb/devices`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use vmrig_shared::errors::{VmrigError, VmrigResult};

use super::{HostUsbDevice, UsbEnumerator};

const SYSFS_USB_DEVICES: &str = "/sys/bus/usb/devices";

pub struct SysfsUsbEnumerator {
    root: PathBuf,
}

impl Default for SysfsUsbEnumerator {
    fn default() -> Self {
        Self::new(SYSFS_USB_DEVICES)
    }
}

impl SysfsUsbEnumerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_device(dir: &Path) -> VmrigResult<Option<HostUsbDevice>> {
        // Interface entries (`1-1:1.0`) have no idVendor.
        let Some(vendor_id) = read_attr(dir, "idVendor")? else {
            return Ok(None);
        };
        let product_id = read_attr(dir, "idProduct")?.unwrap_or_default();
        let bus = parse_number(dir, "busnum")?;
        let address = parse_number(dir, "devnum")?;

        Ok(Some(HostUsbDevice {
            bus,
            address,
            vendor_id: vendor_id.to_ascii_lowercase(),
            product_id: product_id.to_ascii_lowercase(),
            path: dir.to_path_buf(),
        }))
    }
}

impl UsbEnumerator for SysfsUsbEnumerator {
    fn list(&self) -> VmrigResult<Vec<HostUsbDevice>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            VmrigError::Usb(format!("cannot list {}: {}", self.root.display(), e))
        })?;

        let mut devices = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(device) = Self::read_device(&entry.path())? {
                devices.push(device);
            }
        }
        devices.sort_by_key(|d| (d.bus, d.address));
        Ok(devices)
    }

    fn serial(&self, device: &HostUsbDevice) -> VmrigResult<Option<String>> {
        read_attr(&device.path, "serial")
    }
}

fn read_attr(dir: &Path, attr: &str) -> VmrigResult<Option<String>> {
    match std::fs::read_to_string(dir.join(attr)) {
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(VmrigError::Usb(format!(
            "cannot read {}: {}",
            dir.join(attr).display(),
            e
        ))),
    }
}

fn parse_number(dir: &Path, attr: &str) -> VmrigResult<u32> {
    read_attr(dir, attr)?
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| VmrigError::Usb(format!("bad {} in {}", attr, dir.display())))
}
