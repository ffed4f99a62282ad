//! Fixed names and values shared across the runtime.

/// File names inside the vmrig home and per-VM directories.
pub mod filenames {
    /// SQLite database file.
    pub const DATABASE: &str = "vmrig.db";

    /// Rolling tracing log.
    pub const TRACE_LOG: &str = "vmrig.log";

    /// Last hypervisor error output (overwritten on every failure).
    pub const LAST_ERROR_LOG: &str = "last.log";

    /// Hypervisor pidfile inside a VM directory.
    pub const PID_FILE: &str = "qemu.pid";

    /// QMP unix socket inside a VM directory.
    pub const QMP_SOCKET: &str = "qmp.sock";
}

/// Directory names inside the vmrig home.
pub mod dirs {
    pub const VMS: &str = "vms";
    pub const LOGS: &str = "logs";
    pub const DB: &str = "db";
}

/// Environment variables read at startup.
pub mod envs {
    /// Overrides the vmrig home directory.
    pub const VMRIG_HOME: &str = "VMRIG_HOME";
}

/// Display settings.
pub mod display {
    /// VNC and SPICE ports are offset from the persisted display value.
    pub const PORT_BASE: u32 = 5900;

    pub const LOOPBACK: &str = "127.0.0.1";
}

/// USB controller selection.
pub mod usb {
    /// Controller version string stored for new VMs; selects `qemu-xhci`.
    pub const DEFAULT_VERSION: &str = "XHCI";

    pub const XHCI_DEVICE: &str = "qemu-xhci";
    pub const EHCI_DEVICE: &str = "usb-ehci";
}

/// Network defaults.
pub mod net {
    /// NIC model that gets vhost enabled by default.
    pub const DEFAULT_DRIVER: &str = "virtio-net-pci";

    /// First MAC handed out by a fresh database (de:ad:00:00:00:00).
    pub const MAC_COUNTER_START: u64 = 0xdead_0000_0000;

    /// Tap permission polling limit.
    pub const TAP_PERMISSION_ATTEMPTS: u32 = 40;
    pub const TAP_PERMISSION_INTERVAL_MS: u64 = 50;
}
