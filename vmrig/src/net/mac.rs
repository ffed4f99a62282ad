//! MAC address and interface name helpers used at VM creation.

/// Longest interface name the kernel accepts (without the NUL).
pub const MAX_IFNAME_LEN: usize = libc::IFNAMSIZ - 1;

/// Render the low 48 bits of a counter as a colon separated MAC.
pub fn format_mac(counter: u64) -> String {
    let bytes = counter.to_be_bytes();
    bytes[2..]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Make `name` usable as a host interface name.
///
/// Names over the kernel limit are replaced by `vm-<mac hex>` and the
/// original is returned as the alternate name.
pub fn fit_iface_name(name: &str, mac: &str) -> (String, Option<String>) {
    if name.len() <= MAX_IFNAME_LEN {
        return (name.to_string(), None);
    }

    let short: String = format!("vm-{}", mac.replace(':', ""))
        .chars()
        .take(MAX_IFNAME_LEN)
        .collect();
    (short, Some(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mac() {
        assert_eq!(format_mac(0xdead_0000_0001), "de:ad:00:00:00:01");
        assert_eq!(format_mac(0x0102_0304_0506), "01:02:03:04:05:06");
    }

    #[test]
    fn test_short_name_kept() {
        let (name, alt) = fit_iface_name("web_eth0", "de:ad:00:00:00:01");
        assert_eq!(name, "web_eth0");
        assert!(alt.is_none());
    }

    #[test]
    fn test_long_name_replaced() {
        let (name, alt) = fit_iface_name("very-long-vm-name_eth0", "de:ad:00:00:00:0a");
        assert_eq!(name, "vm-dead0000000a");
        assert!(name.len() <= MAX_IFNAME_LEN);
        assert_eq!(alt.as_deref(), Some("very-long-vm-name_eth0"));
    }
}
