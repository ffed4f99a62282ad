//! Table definitions.

use crate::runtime::constants::net::MAC_COUNTER_START;

pub(super) const SCHEMA_VERSION: i32 = 1;

pub(super) const CREATE_TABLES: &str = "
CREATE TABLE vms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    mem INTEGER NOT NULL,
    smp INTEGER NOT NULL,
    kvm INTEGER NOT NULL DEFAULT 0,
    hcpu INTEGER NOT NULL DEFAULT 0,
    vnc INTEGER NOT NULL,
    arch TEXT NOT NULL,
    iso TEXT NOT NULL DEFAULT '',
    install INTEGER NOT NULL DEFAULT 0,
    usb INTEGER NOT NULL DEFAULT 0,
    usb_type TEXT NOT NULL DEFAULT '',
    usb_boot INTEGER NOT NULL DEFAULT 0,
    bios TEXT NOT NULL DEFAULT '',
    kernel TEXT NOT NULL DEFAULT '',
    kernel_append TEXT NOT NULL DEFAULT '',
    initrd TEXT NOT NULL DEFAULT '',
    machine TEXT NOT NULL DEFAULT '',
    tty_path TEXT NOT NULL DEFAULT '',
    socket_path TEXT NOT NULL DEFAULT '',
    mouse_override INTEGER NOT NULL DEFAULT 0,
    fs9p_enable INTEGER NOT NULL DEFAULT 0,
    fs9p_path TEXT NOT NULL DEFAULT '',
    fs9p_name TEXT NOT NULL DEFAULT '',
    spice INTEGER NOT NULL DEFAULT 0,
    debug_port INTEGER,
    debug_freeze INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE lastval (
    id INTEGER PRIMARY KEY,
    mac INTEGER NOT NULL,
    vnc INTEGER NOT NULL
);

CREATE TABLE drives (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vm_name TEXT NOT NULL,
    drive_name TEXT NOT NULL,
    drive_drv TEXT NOT NULL,
    capacity INTEGER NOT NULL,
    boot INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE ifaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vm_name TEXT NOT NULL,
    if_name TEXT NOT NULL,
    mac_addr TEXT NOT NULL UNIQUE,
    ipv4_addr TEXT NOT NULL DEFAULT '',
    if_drv TEXT NOT NULL,
    vhost INTEGER NOT NULL DEFAULT 0,
    macvtap INTEGER NOT NULL DEFAULT 0,
    parent_eth TEXT NOT NULL DEFAULT '',
    altname TEXT NOT NULL DEFAULT ''
);

CREATE TABLE vmsnapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vm_name TEXT NOT NULL,
    snap_name TEXT NOT NULL,
    load INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL
);

CREATE TABLE usb (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vm_name TEXT NOT NULL,
    dev_name TEXT NOT NULL,
    vendor_id TEXT NOT NULL,
    product_id TEXT NOT NULL,
    serial TEXT NOT NULL DEFAULT ''
);
";

/// SQLite integers are signed; the 48-bit counter always fits.
pub(super) fn initial_mac_counter() -> i64 {
    i64::try_from(MAC_COUNTER_START).unwrap_or(i64::MAX)
}
