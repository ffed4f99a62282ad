//! Map persisted (vendor, product, serial) triples to live bus addresses.

use std::collections::{HashMap, HashSet};

use crate::runtime::types::UsbRecord;

use super::{HostUsbDevice, UsbEnumerator};

/// Bus and device number as accepted by `usb-host`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbAddress {
    pub bus: u32,
    pub address: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct UsbKey {
    vendor_id: String,
    product_id: String,
    serial: String,
}

impl UsbKey {
    fn new(vendor_id: &str, product_id: &str, serial: &str) -> Self {
        Self {
            vendor_id: vendor_id.to_ascii_lowercase(),
            product_id: product_id.to_ascii_lowercase(),
            serial: serial.to_string(),
        }
    }
}

/// Session-scoped resolver.
///
/// Every serial read is cached under the device's real triple, so each
/// host device is opened at most once per resolver.
pub struct UsbResolver<'a> {
    usb: &'a dyn UsbEnumerator,
    devices: Option<Vec<HostUsbDevice>>,
    cache: HashMap<UsbKey, UsbAddress>,
    probed: HashSet<UsbAddress>,
}

impl<'a> UsbResolver<'a> {
    pub fn new(usb: &'a dyn UsbEnumerator) -> Self {
        Self {
            usb,
            devices: None,
            cache: HashMap::new(),
            probed: HashSet::new(),
        }
    }

    /// `None` when no attached device matches; never an error.
    pub fn resolve(&mut self, record: &UsbRecord) -> Option<UsbAddress> {
        let wanted = UsbKey::new(&record.vendor_id, &record.product_id, &record.serial);
        if let Some(addr) = self.cache.get(&wanted) {
            return Some(*addr);
        }

        let usb = self.usb;
        let devices = self.devices.get_or_insert_with(|| {
            usb.list().unwrap_or_else(|e| {
                tracing::warn!("USB enumeration failed: {}", e);
                Vec::new()
            })
        });

        for device in devices.iter() {
            if !device.vendor_id.eq_ignore_ascii_case(&wanted.vendor_id)
                || !device.product_id.eq_ignore_ascii_case(&wanted.product_id)
            {
                continue;
            }

            let addr = UsbAddress {
                bus: device.bus,
                address: device.address,
            };
            // Already read and cached under its own serial, which is not ours.
            if self.probed.contains(&addr) {
                continue;
            }

            let serial = match usb.serial(device) {
                Ok(serial) => serial.unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(bus = addr.bus, address = addr.address, "Cannot read USB serial: {}", e);
                    continue;
                }
            };
            self.probed.insert(addr);

            let key = UsbKey::new(&device.vendor_id, &device.product_id, &serial);
            let matched = key == wanted;
            self.cache.insert(key, addr);
            if matched {
                return Some(addr);
            }
        }

        tracing::debug!(device = %record.name, "USB device not attached");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::testing::CountingUsbEnumerator;

    fn record(vendor: &str, product: &str, serial: &str) -> UsbRecord {
        UsbRecord {
            name: "dev".into(),
            vendor_id: vendor.into(),
            product_id: product.into(),
            serial: serial.into(),
        }
    }

    #[test]
    fn test_repeat_resolve_skips_serial_reads() {
        let usb = CountingUsbEnumerator::new().with_device(1, 4, "0781", "5567", Some("AAA"));
        let mut resolver = UsbResolver::new(&usb);
        let wanted = record("0781", "5567", "AAA");

        let first = resolver.resolve(&wanted);
        let reads = usb.serial_calls.get();
        let second = resolver.resolve(&wanted);

        assert_eq!(first, Some(UsbAddress { bus: 1, address: 4 }));
        assert_eq!(second, first);
        assert_eq!(usb.serial_calls.get(), reads);
    }

    #[test]
    fn test_mismatch_is_cached_for_later_records() {
        let usb = CountingUsbEnumerator::new()
            .with_device(1, 4, "0781", "5567", Some("AAA"))
            .with_device(1, 5, "0781", "5567", Some("BBB"));
        let mut resolver = UsbResolver::new(&usb);

        assert_eq!(
            resolver.resolve(&record("0781", "5567", "BBB")),
            Some(UsbAddress { bus: 1, address: 5 })
        );
        assert_eq!(usb.serial_calls.get(), 2);

        // AAA was read while looking for BBB.
        assert_eq!(
            resolver.resolve(&record("0781", "5567", "AAA")),
            Some(UsbAddress { bus: 1, address: 4 })
        );
        assert_eq!(usb.serial_calls.get(), 2);
        assert_eq!(usb.list_calls.get(), 1);
    }

    #[test]
    fn test_unresolved_when_absent() {
        let usb = CountingUsbEnumerator::new().with_device(1, 4, "0781", "5567", Some("AAA"));
        let mut resolver = UsbResolver::new(&usb);

        assert_eq!(resolver.resolve(&record("0781", "5567", "ZZZ")), None);
        assert_eq!(resolver.resolve(&record("046d", "c52b", "")), None);
        // The one candidate is never reopened.
        assert_eq!(resolver.resolve(&record("0781", "5567", "YYY")), None);
        assert_eq!(usb.serial_calls.get(), 1);
    }

    #[test]
    fn test_ids_compare_case_insensitively() {
        let usb = CountingUsbEnumerator::new().with_device(3, 2, "1d6b", "0002", None);
        let mut resolver = UsbResolver::new(&usb);

        assert_eq!(
            resolver.resolve(&record("1D6B", "0002", "")),
            Some(UsbAddress { bus: 3, address: 2 })
        );
    }
}
