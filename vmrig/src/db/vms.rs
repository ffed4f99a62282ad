//! VM, drive, interface, USB and snapshot rows.

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use vmrig_shared::errors::{VmrigError, VmrigResult};

use super::{Database, db_err};
use crate::net::mac::{fit_iface_name, format_mac};
use crate::runtime::constants::net::DEFAULT_DRIVER;
use crate::runtime::types::{
    DriveRecord, InterfaceRecord, MacvtapMode, NewVm, UsbRecord, VmData, VmRecord,
};

const MAX_NAME_LEN: usize = 30;

const VM_COLUMNS: &str = "name, mem, smp, kvm, hcpu, vnc, arch, iso, install, usb, usb_type, \
     bios, kernel, kernel_append, initrd, machine, tty_path, socket_path, mouse_override, \
     fs9p_enable, fs9p_path, fs9p_name, spice, debug_port, debug_freeze";

/// Typed access to VM definitions.
#[derive(Clone)]
pub struct VmStore {
    db: Database,
}

impl VmStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn exists(&self, name: &str) -> VmrigResult<bool> {
        vm_exists(&self.db.conn(), name)
    }

    /// All VM names, sorted.
    pub fn list_names(&self) -> VmrigResult<Vec<String>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare("SELECT name FROM vms ORDER BY name ASC"))?;
        let names = db_err!(stmt.query_map([], |row| row.get(0)))?;
        db_err!(names.collect::<Result<Vec<String>, _>>())
    }

    pub fn get_vm(&self, name: &str) -> VmrigResult<Option<VmRecord>> {
        let conn = self.db.conn();
        db_err!(
            conn.query_row(
                &format!("SELECT {} FROM vms WHERE name = ?1", VM_COLUMNS),
                params![name],
                vm_from_row,
            )
            .optional()
        )
    }

    /// Drives in insertion order.
    pub fn drives(&self, name: &str) -> VmrigResult<Vec<DriveRecord>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare(
            "SELECT drive_name, drive_drv, capacity, boot FROM drives
             WHERE vm_name = ?1 ORDER BY id ASC"
        ))?;
        let rows = db_err!(stmt.query_map(params![name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, bool>(3)?,
            ))
        }))?;

        let mut drives = Vec::new();
        for row in rows {
            let (file_name, kind, capacity_gb, boot) = db_err!(row)?;
            drives.push(DriveRecord {
                file_name,
                kind: kind.parse()?,
                capacity_gb,
                boot,
            });
        }
        Ok(drives)
    }

    /// Network interfaces in insertion order.
    pub fn interfaces(&self, name: &str) -> VmrigResult<Vec<InterfaceRecord>> {
        let conn = self.db.conn();
        interfaces_of(&conn, name)
    }

    pub fn usb_devices(&self, name: &str) -> VmrigResult<Vec<UsbRecord>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare(
            "SELECT dev_name, vendor_id, product_id, serial FROM usb
             WHERE vm_name = ?1 ORDER BY id ASC"
        ))?;
        let rows = db_err!(stmt.query_map(params![name], |row| {
            Ok(UsbRecord {
                name: row.get(0)?,
                vendor_id: row.get(1)?,
                product_id: row.get(2)?,
                serial: row.get(3)?,
            })
        }))?;
        db_err!(rows.collect::<Result<Vec<_>, _>>())
    }

    /// Load a VM with all of its devices.
    pub fn load(&self, name: &str) -> VmrigResult<VmData> {
        let vm = self
            .get_vm(name)?
            .ok_or_else(|| VmrigError::NotFound(format!("vm {}", name)))?;

        Ok(VmData {
            vm,
            drives: self.drives(name)?,
            interfaces: self.interfaces(name)?,
            usb: self.usb_devices(name)?,
        })
    }

    /// Snapshot marked to be loaded on the next start.
    pub fn pending_snapshot(&self, name: &str) -> VmrigResult<Option<String>> {
        let conn = self.db.conn();
        db_err!(
            conn.query_row(
                "SELECT snap_name FROM vmsnapshots
                 WHERE vm_name = ?1 AND load = 1 ORDER BY id ASC LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()
        )
    }

    pub fn reset_snapshot_load(&self, name: &str) -> VmrigResult<()> {
        let conn = self.db.conn();
        db_err!(conn.execute(
            "UPDATE vmsnapshots SET load = 0 WHERE vm_name = ?1",
            params![name],
        ))?;
        Ok(())
    }

    pub fn add_snapshot(&self, name: &str, snap_name: &str, load: bool) -> VmrigResult<()> {
        let conn = self.db.conn();
        db_err!(conn.execute(
            "INSERT INTO vmsnapshots (vm_name, snap_name, load, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, snap_name, load, Utc::now().to_rfc3339()],
        ))?;
        Ok(())
    }

    /// Record whether USB was enabled when the VM booted.
    pub fn set_usb_boot_state(&self, name: &str, enabled: bool) -> VmrigResult<()> {
        let conn = self.db.conn();
        db_err!(conn.execute(
            "UPDATE vms SET usb_boot = ?1 WHERE name = ?2",
            params![enabled, name],
        ))?;
        Ok(())
    }

    pub fn usb_boot_state(&self, name: &str) -> VmrigResult<Option<bool>> {
        let conn = self.db.conn();
        db_err!(
            conn.query_row(
                "SELECT usb_boot FROM vms WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
        )
    }

    /// Clear the install flag after the guest OS has been installed.
    pub fn mark_installed(&self, name: &str) -> VmrigResult<()> {
        let conn = self.db.conn();
        let changed = db_err!(conn.execute(
            "UPDATE vms SET install = 0 WHERE name = ?1",
            params![name],
        ))?;
        if changed == 0 {
            return Err(VmrigError::NotFound(format!("vm {}", name)));
        }
        Ok(())
    }

    /// Insert a VM row as-is.
    pub fn insert_vm(&self, vm: &VmRecord) -> VmrigResult<()> {
        validate_vm_name(&vm.name)?;
        let conn = self.db.conn();
        if vm_exists(&conn, &vm.name)? {
            return Err(VmrigError::InvalidState(format!(
                "vm {} already exists",
                vm.name
            )));
        }
        insert_vm_row(&conn, vm)
    }

    /// Overwrite every column of an existing VM row.
    pub fn save_vm(&self, vm: &VmRecord) -> VmrigResult<()> {
        let conn = self.db.conn();
        let changed = db_err!(conn.execute(
            "UPDATE vms SET mem = ?2, smp = ?3, kvm = ?4, hcpu = ?5, vnc = ?6, arch = ?7,
                iso = ?8, install = ?9, usb = ?10, usb_type = ?11, bios = ?12, kernel = ?13,
                kernel_append = ?14, initrd = ?15, machine = ?16, tty_path = ?17,
                socket_path = ?18, mouse_override = ?19, fs9p_enable = ?20, fs9p_path = ?21,
                fs9p_name = ?22, spice = ?23, debug_port = ?24, debug_freeze = ?25
             WHERE name = ?1",
            params![
                vm.name,
                vm.memory_mb,
                vm.cpus,
                vm.kvm,
                vm.host_cpu,
                vm.vnc,
                vm.arch,
                vm.install_source,
                vm.install,
                vm.usb_enabled,
                vm.usb_version,
                path_text(&vm.bios),
                path_text(&vm.kernel),
                opt_text(&vm.kernel_cmdline),
                path_text(&vm.initrd),
                opt_text(&vm.machine),
                path_text(&vm.tty_path),
                path_text(&vm.socket_path),
                vm.mouse_override,
                vm.fs9p_enabled,
                path_text(&vm.fs9p_path),
                opt_text(&vm.fs9p_tag),
                vm.spice,
                vm.debug_port,
                vm.debug_freeze,
            ],
        ))?;
        if changed == 0 {
            return Err(VmrigError::NotFound(format!("vm {}", vm.name)));
        }
        Ok(())
    }

    pub fn add_drive(&self, vm_name: &str, drive: &DriveRecord) -> VmrigResult<()> {
        insert_drive_row(&self.db.conn(), vm_name, drive)
    }

    pub fn add_interface(&self, vm_name: &str, iface: &InterfaceRecord) -> VmrigResult<()> {
        insert_iface_row(&self.db.conn(), vm_name, iface)
    }

    pub fn add_usb(&self, vm_name: &str, usb: &UsbRecord) -> VmrigResult<()> {
        let conn = self.db.conn();
        db_err!(conn.execute(
            "INSERT INTO usb (vm_name, dev_name, vendor_id, product_id, serial)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![vm_name, usb.name, usb.vendor_id, usb.product_id, usb.serial],
        ))?;
        Ok(())
    }

    /// Last allocated MAC counter and next VNC display.
    pub fn last_values(&self) -> VmrigResult<(u64, u32)> {
        read_last_values(&self.db.conn())
    }

    /// Create a VM with one boot drive and `iface_count` interfaces.
    ///
    /// VNC display and MAC addresses come from the `lastval` row, which is
    /// read and advanced in the same transaction as the inserts.
    pub fn create(&self, new: &NewVm) -> VmrigResult<VmData> {
        validate_vm_name(&new.name)?;

        self.db.transaction(|tx| {
            if vm_exists(tx, &new.name)? {
                return Err(VmrigError::InvalidState(format!(
                    "vm {} already exists",
                    new.name
                )));
            }

            let (mut mac_counter, vnc) = read_last_values(tx)?;

            let mut vm = VmRecord::new(&new.name, &new.arch);
            vm.cpus = new.cpus;
            vm.memory_mb = new.memory_mb;
            vm.vnc = vnc;
            vm.kvm = new.kvm;
            vm.host_cpu = new.kvm;
            vm.install_source = new.install_source.clone();
            vm.install = !new.install_source.is_empty();
            vm.usb_enabled = new.usb_enabled;
            vm.spice = new.spice;
            insert_vm_row(tx, &vm)?;

            let drive = DriveRecord {
                file_name: format!("{}_a.img", new.name),
                kind: new.drive_kind,
                capacity_gb: new.disk_gb,
                boot: true,
            };
            insert_drive_row(tx, &new.name, &drive)?;

            let mut interfaces = Vec::new();
            for n in 0..new.iface_count {
                mac_counter = mac_counter.checked_add(1).ok_or_else(|| {
                    VmrigError::InvalidState("MAC address space exhausted".into())
                })?;
                let mac = format_mac(mac_counter);
                let (if_name, altname) = fit_iface_name(&format!("{}_eth{}", new.name, n), &mac);

                let iface = InterfaceRecord {
                    name: if_name,
                    mac,
                    driver: new.net_driver.clone(),
                    vhost: cfg!(target_os = "linux") && new.net_driver == DEFAULT_DRIVER,
                    macvtap: MacvtapMode::Disabled,
                    parent: None,
                    altname,
                    ipv4: None,
                };
                insert_iface_row(tx, &new.name, &iface)?;
                interfaces.push(iface);
            }

            let next_vnc = vnc
                .checked_add(1)
                .ok_or_else(|| VmrigError::InvalidState("VNC display space exhausted".into()))?;
            let mac_value = i64::try_from(mac_counter)
                .map_err(|_| VmrigError::InvalidState("MAC counter out of range".into()))?;
            db_err!(tx.execute(
                "UPDATE lastval SET mac = ?1, vnc = ?2 WHERE id = 1",
                params![mac_value, next_vnc],
            ))?;

            tracing::info!(vm = %new.name, vnc, interfaces = interfaces.len(), "Created VM");

            Ok(VmData {
                vm,
                drives: vec![drive],
                interfaces,
                usb: Vec::new(),
            })
        })
    }

    /// Delete a VM and every row that references it.
    pub fn delete(&self, name: &str) -> VmrigResult<()> {
        self.db.transaction(|tx| {
            for table in ["drives", "vmsnapshots", "ifaces", "usb"] {
                db_err!(tx.execute(
                    &format!("DELETE FROM {} WHERE vm_name = ?1", table),
                    params![name],
                ))?;
            }
            db_err!(tx.execute("DELETE FROM vms WHERE name = ?1", params![name]))?;
            Ok(())
        })
    }
}

/// VM names double as directory names.
pub fn validate_vm_name(name: &str) -> VmrigResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(VmrigError::Config(format!("invalid vm name: {:?}", name)))
    }
}

fn vm_exists(conn: &Connection, name: &str) -> VmrigResult<bool> {
    let count: i64 = db_err!(conn.query_row(
        "SELECT COUNT(*) FROM vms WHERE name = ?1",
        params![name],
        |row| row.get(0),
    ))?;
    Ok(count > 0)
}

fn read_last_values(conn: &Connection) -> VmrigResult<(u64, u32)> {
    let (mac, vnc): (i64, u32) = db_err!(conn.query_row(
        "SELECT mac, vnc FROM lastval WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    ))?;
    let mac = u64::try_from(mac)
        .map_err(|_| VmrigError::Database(format!("negative MAC counter: {}", mac)))?;
    Ok((mac, vnc))
}

fn interfaces_of(conn: &Connection, name: &str) -> VmrigResult<Vec<InterfaceRecord>> {
    let mut stmt = db_err!(conn.prepare(
        "SELECT if_name, mac_addr, if_drv, vhost, macvtap, parent_eth, altname, ipv4_addr
         FROM ifaces WHERE vm_name = ?1 ORDER BY id ASC"
    ))?;
    let rows = db_err!(stmt.query_map(params![name], |row| {
        Ok(InterfaceRecord {
            name: row.get(0)?,
            mac: row.get(1)?,
            driver: row.get(2)?,
            vhost: row.get(3)?,
            macvtap: MacvtapMode::from_db(row.get(4)?),
            parent: non_empty(row.get(5)?),
            altname: non_empty(row.get(6)?),
            ipv4: non_empty(row.get(7)?),
        })
    }))?;
    db_err!(rows.collect::<Result<Vec<_>, _>>())
}

fn vm_from_row(row: &Row<'_>) -> rusqlite::Result<VmRecord> {
    Ok(VmRecord {
        name: row.get("name")?,
        memory_mb: row.get("mem")?,
        cpus: row.get("smp")?,
        kvm: row.get("kvm")?,
        host_cpu: row.get("hcpu")?,
        vnc: row.get("vnc")?,
        arch: row.get("arch")?,
        install_source: row.get("iso")?,
        install: row.get("install")?,
        usb_enabled: row.get("usb")?,
        usb_version: row.get("usb_type")?,
        bios: non_empty_path(row.get("bios")?),
        kernel: non_empty_path(row.get("kernel")?),
        kernel_cmdline: non_empty(row.get("kernel_append")?),
        initrd: non_empty_path(row.get("initrd")?),
        machine: non_empty(row.get("machine")?),
        tty_path: non_empty_path(row.get("tty_path")?),
        socket_path: non_empty_path(row.get("socket_path")?),
        mouse_override: row.get("mouse_override")?,
        fs9p_enabled: row.get("fs9p_enable")?,
        fs9p_path: non_empty_path(row.get("fs9p_path")?),
        fs9p_tag: non_empty(row.get("fs9p_name")?),
        spice: row.get("spice")?,
        debug_port: row.get("debug_port")?,
        debug_freeze: row.get("debug_freeze")?,
    })
}

fn insert_vm_row(conn: &Connection, vm: &VmRecord) -> VmrigResult<()> {
    db_err!(conn.execute(
        &format!(
            "INSERT INTO vms ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
             ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
            VM_COLUMNS
        ),
        params![
            vm.name,
            vm.memory_mb,
            vm.cpus,
            vm.kvm,
            vm.host_cpu,
            vm.vnc,
            vm.arch,
            vm.install_source,
            vm.install,
            vm.usb_enabled,
            vm.usb_version,
            path_text(&vm.bios),
            path_text(&vm.kernel),
            opt_text(&vm.kernel_cmdline),
            path_text(&vm.initrd),
            opt_text(&vm.machine),
            path_text(&vm.tty_path),
            path_text(&vm.socket_path),
            vm.mouse_override,
            vm.fs9p_enabled,
            path_text(&vm.fs9p_path),
            opt_text(&vm.fs9p_tag),
            vm.spice,
            vm.debug_port,
            vm.debug_freeze,
        ],
    ))?;
    Ok(())
}

fn insert_drive_row(conn: &Connection, vm_name: &str, drive: &DriveRecord) -> VmrigResult<()> {
    db_err!(conn.execute(
        "INSERT INTO drives (vm_name, drive_name, drive_drv, capacity, boot)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            vm_name,
            drive.file_name,
            drive.kind.as_str(),
            drive.capacity_gb,
            drive.boot
        ],
    ))?;
    Ok(())
}

fn insert_iface_row(conn: &Connection, vm_name: &str, iface: &InterfaceRecord) -> VmrigResult<()> {
    db_err!(conn.execute(
        "INSERT INTO ifaces (vm_name, if_name, mac_addr, ipv4_addr, if_drv, vhost, macvtap,
                             parent_eth, altname)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            vm_name,
            iface.name,
            iface.mac,
            opt_text(&iface.ipv4),
            iface.driver,
            iface.vhost,
            iface.macvtap.to_db(),
            opt_text(&iface.parent),
            opt_text(&iface.altname),
        ],
    ))?;
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn non_empty_path(value: String) -> Option<PathBuf> {
    non_empty(value).map(PathBuf::from)
}

fn opt_text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn path_text(value: &Option<PathBuf>) -> String {
    value
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}
