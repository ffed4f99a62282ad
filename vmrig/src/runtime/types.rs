//! Persisted VM records.
//!
//! Each struct mirrors one store table row. Optional text columns are
//! stored as empty strings and surface here as `None`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use vmrig_shared::errors::VmrigError;

/// Block device bus of a drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveKind {
    Ide,
    Scsi,
    Virtio,
}

impl DriveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveKind::Ide => "ide",
            DriveKind::Scsi => "scsi",
            DriveKind::Virtio => "virtio",
        }
    }
}

impl fmt::Display for DriveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriveKind {
    type Err = VmrigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ide" => Ok(DriveKind::Ide),
            "scsi" => Ok(DriveKind::Scsi),
            "virtio" => Ok(DriveKind::Virtio),
            other => Err(VmrigError::Config(format!("unknown drive kind: {}", other))),
        }
    }
}

/// macvtap mode of an interface; `Disabled` means a plain tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacvtapMode {
    #[default]
    Disabled,
    Bridge,
    Private,
    Vepa,
}

impl MacvtapMode {
    pub fn from_db(value: i64) -> Self {
        match value {
            1 => MacvtapMode::Bridge,
            2 => MacvtapMode::Private,
            3 => MacvtapMode::Vepa,
            _ => MacvtapMode::Disabled,
        }
    }

    pub fn to_db(self) -> i64 {
        match self {
            MacvtapMode::Disabled => 0,
            MacvtapMode::Bridge => 1,
            MacvtapMode::Private => 2,
            MacvtapMode::Vepa => 3,
        }
    }

    /// Mode keyword understood by `ip link add ... type macvtap mode <m>`.
    pub fn ip_mode(self) -> Option<&'static str> {
        match self {
            MacvtapMode::Disabled => None,
            MacvtapMode::Bridge => Some("bridge"),
            MacvtapMode::Private => Some("private"),
            MacvtapMode::Vepa => Some("vepa"),
        }
    }
}

/// Main VM row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRecord {
    pub name: String,
    pub memory_mb: u32,
    pub cpus: u32,
    pub kvm: bool,
    pub host_cpu: bool,
    /// VNC display number; the TCP port is this plus 5900.
    pub vnc: u32,
    /// QEMU target suffix, e.g. `x86_64`.
    pub arch: String,
    /// ISO or disk image used for installation (empty when none).
    pub install_source: String,
    /// Boot from `install_source` on the next start.
    pub install: bool,
    pub mouse_override: bool,
    pub usb_enabled: bool,
    /// USB controller version string.
    pub usb_version: String,
    pub fs9p_enabled: bool,
    pub fs9p_path: Option<PathBuf>,
    pub fs9p_tag: Option<String>,
    pub spice: bool,
    pub debug_port: Option<u16>,
    pub debug_freeze: bool,
    pub bios: Option<PathBuf>,
    pub machine: Option<String>,
    pub kernel: Option<PathBuf>,
    pub kernel_cmdline: Option<String>,
    pub initrd: Option<PathBuf>,
    pub tty_path: Option<PathBuf>,
    pub socket_path: Option<PathBuf>,
}

impl VmRecord {
    /// A record with every optional feature off.
    pub fn new(name: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            memory_mb: 256,
            cpus: 1,
            kvm: false,
            host_cpu: false,
            vnc: 0,
            arch: arch.into(),
            install_source: String::new(),
            install: false,
            mouse_override: false,
            usb_enabled: false,
            usb_version: crate::runtime::constants::usb::DEFAULT_VERSION.to_string(),
            fs9p_enabled: false,
            fs9p_path: None,
            fs9p_tag: None,
            spice: false,
            debug_port: None,
            debug_freeze: false,
            bios: None,
            machine: None,
            kernel: None,
            kernel_cmdline: None,
            initrd: None,
            tty_path: None,
            socket_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveRecord {
    /// Image file name inside the VM directory.
    pub file_name: String,
    pub kind: DriveKind,
    pub capacity_gb: u32,
    pub boot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    /// Host interface name (at most 15 bytes on Linux).
    pub name: String,
    pub mac: String,
    /// QEMU NIC model, e.g. `virtio-net-pci`.
    pub driver: String,
    pub vhost: bool,
    pub macvtap: MacvtapMode,
    /// Lower interface for macvtap.
    pub parent: Option<String>,
    pub altname: Option<String>,
    pub ipv4: Option<String>,
}

impl InterfaceRecord {
    pub fn tap(name: impl Into<String>, mac: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mac: mac.into(),
            driver: driver.into(),
            vhost: false,
            macvtap: MacvtapMode::Disabled,
            parent: None,
            altname: None,
            ipv4: None,
        }
    }
}

/// USB device to pass through, identified by hex ids and serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbRecord {
    pub name: String,
    pub vendor_id: String,
    pub product_id: String,
    pub serial: String,
}

/// Everything needed to compile a launch plan for one VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmData {
    pub vm: VmRecord,
    pub drives: Vec<DriveRecord>,
    pub interfaces: Vec<InterfaceRecord>,
    pub usb: Vec<UsbRecord>,
}

/// Input of VM creation.
#[derive(Debug, Clone)]
pub struct NewVm {
    pub name: String,
    pub arch: String,
    pub cpus: u32,
    pub memory_mb: u32,
    pub disk_gb: u32,
    pub drive_kind: DriveKind,
    pub install_source: String,
    pub iface_count: u32,
    pub net_driver: String,
    pub kvm: bool,
    pub usb_enabled: bool,
    pub spice: bool,
}
