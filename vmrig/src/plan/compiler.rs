//! Translate a stored VM into a QEMU command line.
//!
//! Flags are appended in a fixed order; QEMU itself is indifferent to most
//! of it, but stable output keeps `cmdline` diffable and the device
//! numbering (`hd<N>`, `netdev<N>`) tied to persisted order.

use std::fs::File;
use std::io::IsTerminal;
use std::path::Path;

use vmrig_shared::errors::{AbortReason, VmrigResult};

use super::{CompileMode, CompiledPlan, LaunchFlags, LaunchPlan};
use crate::db::VmStore;
use crate::net::{NetController, NetDeviceManager};
use crate::runtime::constants::{display, usb};
use crate::runtime::layout::{FilesystemLayout, VmLayout};
use crate::runtime::options::VmrigOptions;
use crate::runtime::types::{DriveKind, VmData, VmRecord};
use crate::usb::{UsbEnumerator, UsbResolver};

/// Builds launch plans against one store and one set of host capabilities.
pub struct PlanCompiler<'a> {
    options: &'a VmrigOptions,
    layout: &'a FilesystemLayout,
    store: &'a VmStore,
    net: &'a dyn NetController,
    usb: &'a dyn UsbEnumerator,
}

impl<'a> PlanCompiler<'a> {
    pub fn new(
        options: &'a VmrigOptions,
        layout: &'a FilesystemLayout,
        store: &'a VmStore,
        net: &'a dyn NetController,
        usb: &'a dyn UsbEnumerator,
    ) -> Self {
        Self {
            options,
            layout,
            store,
            net,
            usb,
        }
    }

    /// Compile `data` into a plan.
    ///
    /// In [`CompileMode::Run`] host devices are reconciled and store flags
    /// updated as the plan is built; an abort leaves whatever was already
    /// done in place.
    pub fn compile(
        &self,
        data: &VmData,
        mode: CompileMode,
        flags: LaunchFlags,
    ) -> VmrigResult<CompiledPlan> {
        let vm = &data.vm;
        let vm_layout = self.layout.vm(&vm.name);
        let mut tap_fds = Vec::new();

        let executable = self
            .options
            .qemu_prefix
            .join("bin")
            .join(format!("qemu-system-{}", vm.arch));
        let mut plan = LaunchPlan::new(executable.display().to_string());
        plan.push("-daemonize");

        boot_source(&mut plan, vm, mode)?;
        drives(&mut plan, data, &vm_layout);

        if let Some(snapshot) = self.store.pending_snapshot(&vm.name)? {
            plan.flag("-loadvm", snapshot);
            if mode == CompileMode::Run {
                self.store.reset_snapshot_load(&vm.name)?;
            }
        }

        plan.flag("-m", vm.memory_mb.to_string());
        if vm.cpus > 1 {
            plan.flag("-smp", vm.cpus.to_string());
        }

        if vm.fs9p_enabled {
            match (&vm.fs9p_path, &vm.fs9p_tag) {
                (Some(path), Some(tag)) => {
                    plan.flag(
                        "-fsdev",
                        format!("local,security_model=none,id=fsdev0,path={}", path.display()),
                    );
                    plan.flag("-device", format!("virtio-9p-pci,fsdev=fsdev0,mount_tag={}", tag));
                }
                (path, tag) => tracing::warn!(
                    vm = %vm.name,
                    path_set = path.is_some(),
                    tag_set = tag.is_some(),
                    "9p share enabled without path and tag, not exporting it"
                ),
            }
        }

        if vm.kvm {
            plan.push("-enable-kvm");
            if vm.host_cpu {
                plan.flag("-cpu", "host");
            }
        }

        self.usb_devices(&mut plan, data, mode)?;
        passthrough(&mut plan, vm);

        if vm.mouse_override {
            plan.flag("-usbdevice", "tablet");
        }

        serial_socket(&mut plan, vm, mode)?;

        if let Some(port) = vm.debug_port {
            plan.flag("-gdb", format!("tcp::{}", port));
        }
        if vm.debug_freeze {
            plan.push("-S");
        }

        serial_tty(&mut plan, vm, mode)?;

        let manager = NetDeviceManager::new(self.net);
        for (n, iface) in data.interfaces.iter().enumerate() {
            let binding = manager.ensure(iface, mode)?;
            plan.flag(
                "-device",
                format!("{},mac={},netdev=netdev{}", iface.driver, iface.mac, n),
            );
            plan.flag("-netdev", binding.netdev_arg(iface, n));
            tap_fds.extend(binding.into_fd());
        }

        if flags.temporary {
            plan.push("-snapshot");
        }

        plan.flag("-pidfile", vm_layout.pid_file().display().to_string());
        plan.flag(
            "-qmp",
            format!("unix:{},server,nowait", vm_layout.qmp_socket().display()),
        );

        self.display(&mut plan, vm);

        tracing::debug!(vm = %vm.name, ?mode, args = plan.args().len(), "Compiled launch plan");
        Ok(CompiledPlan { plan, tap_fds })
    }

    fn usb_devices(&self, plan: &mut LaunchPlan, data: &VmData, mode: CompileMode) -> VmrigResult<()> {
        let vm = &data.vm;

        // Hotplug needs to know whether the controller exists.
        if mode == CompileMode::Run {
            self.store.set_usb_boot_state(&vm.name, vm.usb_enabled)?;
        }
        if !vm.usb_enabled {
            return Ok(());
        }

        let controller = if vm.usb_version == usb::DEFAULT_VERSION {
            usb::XHCI_DEVICE
        } else {
            usb::EHCI_DEVICE
        };
        plan.push("-usb");
        plan.flag("-device", controller);

        let mut resolver = UsbResolver::new(self.usb);
        for record in &data.usb {
            let Some(addr) = resolver.resolve(record) else {
                continue;
            };
            plan.flag(
                "-device",
                format!(
                    "usb-host,hostbus={},hostaddr={},id=usb-{}-{}-{}",
                    addr.bus, addr.address, record.vendor_id, record.product_id, record.serial
                ),
            );
        }
        Ok(())
    }

    fn display(&self, plan: &mut LaunchPlan, vm: &VmRecord) {
        if vm.spice {
            let mut spice = format!(
                "port={},disable-ticketing",
                vm.vnc + display::PORT_BASE
            );
            if !self.options.listen_any {
                spice.push_str(&format!(",addr={}", display::LOOPBACK));
            }
            plan.flag("-vga", "qxl");
            plan.flag("-spice", spice);
        } else if self.options.listen_any {
            plan.flag("-vnc", format!(":{}", vm.vnc));
        } else {
            plan.flag("-vnc", format!("{}:{}", display::LOOPBACK, vm.vnc));
        }
    }
}

/// Images ending in `.iso` boot as CD-ROM; anything else is a disk.
fn is_iso(source: &str) -> bool {
    source.len() > 4 && source.ends_with(".iso")
}

fn boot_source(plan: &mut LaunchPlan, vm: &VmRecord, mode: CompileMode) -> VmrigResult<()> {
    let source = vm.install_source.as_str();

    if vm.install {
        if source.is_empty() {
            return match mode {
                CompileMode::Run => Err(AbortReason::InstallSourceMissing.into()),
                CompileMode::Info => Ok(()),
            };
        }
        if is_iso(source) {
            plan.flag("-boot", "d");
            plan.flag("-cdrom", source);
        } else {
            plan.flag("-drive", format!("file={},media=disk,if=ide", source));
        }
    } else if !source.is_empty() {
        if Path::new(source).exists() {
            plan.flag("-cdrom", source);
        } else if mode == CompileMode::Run {
            return Err(AbortReason::InstallSourceNotFound(source.into()).into());
        }
    }
    Ok(())
}

fn drives(plan: &mut LaunchPlan, data: &VmData, vm_layout: &VmLayout) {
    let mut scsi_controller = false;

    for (n, drive) in data.drives.iter().enumerate() {
        let scsi = drive.kind == DriveKind::Scsi;
        if scsi && !scsi_controller {
            plan.flag("-device", "virtio-scsi-pci,id=scsi");
            scsi_controller = true;
        }

        let bus = if scsi { "none" } else { drive.kind.as_str() };
        plan.flag(
            "-drive",
            format!(
                "id=hd{},media=disk,if={},file={}",
                n,
                bus,
                vm_layout.drive_path(&drive.file_name).display()
            ),
        );
        if scsi {
            plan.flag("-device", format!("scsi-hd,drive=hd{}", n));
        }
    }
}

fn passthrough(plan: &mut LaunchPlan, vm: &VmRecord) {
    if let Some(bios) = &vm.bios {
        plan.flag("-bios", bios.display().to_string());
    }
    if let Some(machine) = &vm.machine {
        plan.flag("-M", machine.as_str());
    }
    if let Some(kernel) = &vm.kernel {
        plan.flag("-kernel", kernel.display().to_string());
        if let Some(cmdline) = &vm.kernel_cmdline {
            plan.flag("-append", cmdline.as_str());
        }
    }
    if let Some(initrd) = &vm.initrd {
        plan.flag("-initrd", initrd.display().to_string());
    }
}

fn serial_socket(plan: &mut LaunchPlan, vm: &VmRecord, mode: CompileMode) -> VmrigResult<()> {
    let Some(path) = &vm.socket_path else {
        return Ok(());
    };

    if mode == CompileMode::Run && path.exists() {
        return Err(AbortReason::SocketInUse(path.clone()).into());
    }

    plan.flag(
        "-chardev",
        format!(
            "socket,path={},server,nowait,id=socket_{}",
            path.display(),
            vm.name
        ),
    );
    plan.flag("-device", format!("isa-serial,chardev=socket_{}", vm.name));
    Ok(())
}

fn serial_tty(plan: &mut LaunchPlan, vm: &VmRecord, mode: CompileMode) -> VmrigResult<()> {
    let Some(path) = &vm.tty_path else {
        return Ok(());
    };

    if mode == CompileMode::Run {
        let tty = File::open(path).map_err(|_| AbortReason::TtyMissing(path.clone()))?;
        if !tty.is_terminal() {
            return Err(AbortReason::TtyInvalid(path.clone()).into());
        }
    }

    plan.flag(
        "-chardev",
        format!("tty,path={},id=tty_{}", path.display(), vm.name),
    );
    plan.flag("-device", format!("isa-serial,chardev=tty_{}", vm.name));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::net::TapPolicy;
    use crate::net::testing::FakeNetController;
    use crate::runtime::types::{DriveRecord, InterfaceRecord, UsbRecord};
    use crate::usb::testing::CountingUsbEnumerator;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use vmrig_shared::errors::VmrigError;

    struct Fixture {
        dir: TempDir,
        options: VmrigOptions,
        layout: FilesystemLayout,
        store: VmStore,
        net: FakeNetController,
        usb: CountingUsbEnumerator,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let options = VmrigOptions {
                home_dir: dir.path().to_path_buf(),
                vm_dir: PathBuf::from("vms"),
                qemu_prefix: PathBuf::from("/usr"),
                ..VmrigOptions::default()
            };
            let layout = FilesystemLayout::from_options(&options);
            let store = VmStore::new(Database::open(&layout.db_path()).unwrap());

            Self {
                dir,
                options,
                layout,
                store,
                net: FakeNetController::new(TapPolicy::Precreate),
                usb: CountingUsbEnumerator::new()
                    .with_device(1, 4, "0781", "5567", Some("AAA")),
            }
        }

        fn compiler(&self) -> PlanCompiler<'_> {
            PlanCompiler::new(&self.options, &self.layout, &self.store, &self.net, &self.usb)
        }

        /// One IDE boot drive and one plain virtio tap.
        fn add_vm(&self, vm: VmRecord) -> VmData {
            let name = vm.name.clone();
            self.store.insert_vm(&vm).unwrap();
            self.store
                .add_drive(
                    &name,
                    &DriveRecord {
                        file_name: format!("{}_a.img", name),
                        kind: DriveKind::Ide,
                        capacity_gb: 10,
                        boot: true,
                    },
                )
                .unwrap();
            self.store
                .add_interface(
                    &name,
                    &InterfaceRecord::tap(
                        format!("{}_eth0", name),
                        "de:ad:00:00:00:01",
                        "virtio-net-pci",
                    ),
                )
                .unwrap();
            self.store.load(&name).unwrap()
        }

        fn vm_dir(&self, name: &str) -> String {
            self.dir.path().join("vms").join(name).display().to_string()
        }
    }

    fn web() -> VmRecord {
        let mut vm = VmRecord::new("web", "x86_64");
        vm.vnc = 3;
        vm
    }

    fn info(fx: &Fixture, data: &VmData) -> Vec<String> {
        fx.compiler()
            .compile(data, CompileMode::Info, LaunchFlags::default())
            .unwrap()
            .plan
            .into_args()
    }

    fn position(args: &[String], needle: &str) -> usize {
        args.iter().position(|a| a == needle).unwrap()
    }

    #[test]
    fn test_minimal_info_plan() {
        let fx = Fixture::new();
        let data = fx.add_vm(web());
        let dir = fx.vm_dir("web");

        let expected: Vec<String> = vec![
            "/usr/bin/qemu-system-x86_64".to_string(),
            "-daemonize".into(),
            "-drive".into(),
            format!("id=hd0,media=disk,if=ide,file={}/web_a.img", dir),
            "-m".into(),
            "256".into(),
            "-device".into(),
            "virtio-net-pci,mac=de:ad:00:00:00:01,netdev=netdev0".into(),
            "-netdev".into(),
            "tap,ifname=web_eth0,script=no,downscript=no,id=netdev0".into(),
            "-pidfile".into(),
            format!("{}/qemu.pid", dir),
            "-qmp".into(),
            format!("unix:{}/qmp.sock,server,nowait", dir),
            "-vnc".into(),
            "127.0.0.1:3".into(),
        ];
        assert_eq!(info(&fx, &data), expected);
    }

    #[test]
    fn test_info_is_deterministic() {
        let fx = Fixture::new();
        let mut vm = web();
        vm.cpus = 4;
        vm.kvm = true;
        vm.host_cpu = true;
        vm.usb_enabled = true;
        let data = fx.add_vm(vm);
        fx.store
            .add_usb(
                "web",
                &UsbRecord {
                    name: "stick".into(),
                    vendor_id: "0781".into(),
                    product_id: "5567".into(),
                    serial: "AAA".into(),
                },
            )
            .unwrap();
        let data = VmData {
            usb: fx.store.usb_devices("web").unwrap(),
            ..data
        };

        let first = info(&fx, &data);
        assert_eq!(first, info(&fx, &data));
        assert!(first.windows(2).any(|w| w[0] == "-smp" && w[1] == "4"));
        assert!(first.windows(2).any(|w| w[0] == "-cpu" && w[1] == "host"));
        assert!(first.contains(&"usb-host,hostbus=1,hostaddr=4,id=usb-0781-5567-AAA".to_string()));
    }

    #[test]
    fn test_scsi_controller_emitted_once() {
        let fx = Fixture::new();
        fx.add_vm(web());
        for file in ["web_b.img", "web_c.img"] {
            fx.store
                .add_drive(
                    "web",
                    &DriveRecord {
                        file_name: file.into(),
                        kind: DriveKind::Scsi,
                        capacity_gb: 5,
                        boot: false,
                    },
                )
                .unwrap();
        }
        let args = info(&fx, &fx.store.load("web").unwrap());
        let dir = fx.vm_dir("web");

        let controllers = args.iter().filter(|a| *a == "virtio-scsi-pci,id=scsi").count();
        assert_eq!(controllers, 1);

        let controller = position(&args, "virtio-scsi-pci,id=scsi");
        let hd0 = position(&args, &format!("id=hd0,media=disk,if=ide,file={}/web_a.img", dir));
        let hd1 = position(&args, &format!("id=hd1,media=disk,if=none,file={}/web_b.img", dir));
        assert!(hd0 < controller && controller < hd1);
        assert_eq!(args[hd1 + 2], "scsi-hd,drive=hd1");
        assert!(args.contains(&"scsi-hd,drive=hd2".to_string()));
    }

    #[test]
    fn test_kvm_off_has_no_kvm_flags() {
        let fx = Fixture::new();
        let mut vm = web();
        vm.host_cpu = true;
        let args = info(&fx, &fx.add_vm(vm));

        assert!(!args.contains(&"-enable-kvm".to_string()));
        assert!(!args.contains(&"-cpu".to_string()));
        assert!(!args.contains(&"-smp".to_string()));
    }

    #[test]
    fn test_invalid_tty_aborts() {
        let fx = Fixture::new();
        let tty = fx.dir.path().join("not-a-tty");
        std::fs::write(&tty, b"").unwrap();
        let mut vm = web();
        vm.tty_path = Some(tty.clone());
        let data = fx.add_vm(vm);

        let err = fx
            .compiler()
            .compile(&data, CompileMode::Run, LaunchFlags::default())
            .unwrap_err();
        assert_eq!(err.abort_reason(), Some(&AbortReason::TtyInvalid(tty.clone())));
        // Network devices come after the TTY and were never touched.
        assert!(fx.net.calls().is_empty());

        let args = info(&fx, &data);
        assert!(args.contains(&format!("tty,path={},id=tty_web", tty.display())));
    }

    #[test]
    fn test_missing_tty_aborts() {
        let fx = Fixture::new();
        let tty = fx.dir.path().join("ttyMISSING");
        let mut vm = web();
        vm.tty_path = Some(tty.clone());
        let data = fx.add_vm(vm);

        let err = fx
            .compiler()
            .compile(&data, CompileMode::Run, LaunchFlags::default())
            .unwrap_err();
        assert_eq!(err.abort_reason(), Some(&AbortReason::TtyMissing(tty)));
    }

    #[test]
    fn test_socket_in_use_aborts_only_in_run() {
        let fx = Fixture::new();
        let socket = fx.dir.path().join("serial.sock");
        std::fs::write(&socket, b"").unwrap();
        let mut vm = web();
        vm.socket_path = Some(socket.clone());
        let data = fx.add_vm(vm);

        let err = fx
            .compiler()
            .compile(&data, CompileMode::Run, LaunchFlags::default())
            .unwrap_err();
        assert_eq!(err.abort_reason(), Some(&AbortReason::SocketInUse(socket.clone())));

        let args = info(&fx, &data);
        let chardev = position(&args, "-chardev");
        assert_eq!(
            args[chardev + 1],
            format!("socket,path={},server,nowait,id=socket_web", socket.display())
        );
        assert_eq!(args[chardev + 3], "isa-serial,chardev=socket_web");
    }

    #[test]
    fn test_install_source_handling() {
        let fx = Fixture::new();
        let mut vm = web();
        vm.install = true;
        let data = fx.add_vm(vm);

        let err = fx
            .compiler()
            .compile(&data, CompileMode::Run, LaunchFlags::default())
            .unwrap_err();
        assert_eq!(err.abort_reason(), Some(&AbortReason::InstallSourceMissing));
        assert!(!info(&fx, &data).contains(&"-cdrom".to_string()));

        let mut iso = data.clone();
        iso.vm.install_source = "/iso/alpine.iso".into();
        let args = info(&fx, &iso);
        assert_eq!(args[2..6], ["-boot", "d", "-cdrom", "/iso/alpine.iso"]);

        let mut disk = data.clone();
        disk.vm.install_source = "/img/installer.qcow2".into();
        let args = info(&fx, &disk);
        assert_eq!(args[2..4], ["-drive", "file=/img/installer.qcow2,media=disk,if=ide"]);
    }

    #[test]
    fn test_missing_iso_omitted_in_info() {
        let fx = Fixture::new();
        let mut vm = web();
        vm.install_source = "/nonexistent/alpine.iso".into();
        let data = fx.add_vm(vm);

        assert!(!info(&fx, &data).contains(&"-cdrom".to_string()));

        let err = fx
            .compiler()
            .compile(&data, CompileMode::Run, LaunchFlags::default())
            .unwrap_err();
        assert!(matches!(
            err.abort_reason(),
            Some(AbortReason::InstallSourceNotFound(_))
        ));

        let iso = fx.dir.path().join("present.iso");
        std::fs::write(&iso, b"").unwrap();
        let mut present = data.clone();
        present.vm.install_source = iso.display().to_string();
        let args = info(&fx, &present);
        assert_eq!(args[2..4], ["-cdrom".to_string(), iso.display().to_string()]);
    }

    #[test]
    fn test_info_mutates_nothing() {
        let fx = Fixture::new();
        let mut vm = web();
        vm.usb_enabled = true;
        let data = fx.add_vm(vm);
        fx.store.add_snapshot("web", "clean", true).unwrap();

        let args = info(&fx, &data);

        assert!(args.windows(2).any(|w| w[0] == "-loadvm" && w[1] == "clean"));
        assert_eq!(fx.store.usb_boot_state("web").unwrap(), Some(false));
        assert_eq!(fx.store.pending_snapshot("web").unwrap().as_deref(), Some("clean"));
        assert!(fx.net.calls().is_empty());
    }

    #[test]
    fn test_run_updates_store_and_host() {
        let fx = Fixture::new();
        let mut vm = web();
        vm.usb_enabled = true;
        let data = fx.add_vm(vm);
        fx.store.add_snapshot("web", "clean", true).unwrap();

        let compiled = fx
            .compiler()
            .compile(&data, CompileMode::Run, LaunchFlags { temporary: true })
            .unwrap();
        let args = compiled.plan.args();

        assert!(compiled.tap_fds.is_empty());
        assert_eq!(fx.store.usb_boot_state("web").unwrap(), Some(true));
        assert!(fx.store.pending_snapshot("web").unwrap().is_none());
        assert_eq!(fx.net.mutations(), vec!["create_tap web_eth0"]);
        assert!(args.contains(&"-snapshot".to_string()));
        assert_eq!(args[position(args, "-usb") + 2], "qemu-xhci");
    }

    #[test]
    fn test_unresolved_usb_skipped() {
        let fx = Fixture::new();
        let mut vm = web();
        vm.usb_enabled = true;
        vm.usb_version = "EHCI".into();
        let mut data = fx.add_vm(vm);
        data.usb.push(UsbRecord {
            name: "gone".into(),
            vendor_id: "046d".into(),
            product_id: "c52b".into(),
            serial: String::new(),
        });

        let args = info(&fx, &data);
        assert_eq!(args[position(&args, "-usb") + 2], "usb-ehci");
        assert!(!args.iter().any(|a| a.starts_with("usb-host")));
    }

    #[test]
    fn test_incomplete_9p_share_not_exported() {
        let fx = Fixture::new();
        let mut vm = web();
        vm.fs9p_enabled = true;
        vm.fs9p_path = Some("/srv/share".into());
        let data = fx.add_vm(vm);

        let args = info(&fx, &data);
        assert!(!args.contains(&"-fsdev".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("virtio-9p-pci")));
    }

    #[test]
    fn test_passthrough_and_debug_flags() {
        let fx = Fixture::new();
        let mut vm = web();
        vm.bios = Some("/usr/share/ovmf/OVMF.fd".into());
        vm.machine = Some("q35".into());
        vm.initrd = Some("/boot/initrd.img".into());
        vm.kernel_cmdline = Some("console=ttyS0".into());
        vm.mouse_override = true;
        vm.debug_port = Some(1234);
        vm.debug_freeze = true;
        vm.fs9p_enabled = true;
        vm.fs9p_path = Some("/srv/share".into());
        vm.fs9p_tag = Some("share".into());
        let data = fx.add_vm(vm);

        let args = info(&fx, &data);
        let has = |flag: &str, value: &str| args.windows(2).any(|w| w[0] == flag && w[1] == value);

        assert!(has("-bios", "/usr/share/ovmf/OVMF.fd"));
        assert!(has("-M", "q35"));
        assert!(has("-initrd", "/boot/initrd.img"));
        // No kernel, so no command line.
        assert!(!args.contains(&"-append".to_string()));
        assert!(has("-usbdevice", "tablet"));
        assert!(has("-gdb", "tcp::1234"));
        assert!(args.contains(&"-S".to_string()));
        assert!(has("-fsdev", "local,security_model=none,id=fsdev0,path=/srv/share"));
        assert!(has("-device", "virtio-9p-pci,fsdev=fsdev0,mount_tag=share"));

        let mut with_kernel = data.clone();
        with_kernel.vm.kernel = Some("/boot/vmlinuz".into());
        let args = info(&fx, &with_kernel);
        let kernel = position(&args, "-kernel");
        assert_eq!(args[kernel + 2..kernel + 4], ["-append", "console=ttyS0"]);
    }

    #[test]
    fn test_display_policies() {
        let mut fx = Fixture::new();
        let mut vm = web();
        vm.spice = true;
        let data = fx.add_vm(vm);

        let args = info(&fx, &data);
        assert_eq!(
            args[args.len() - 4..],
            ["-vga", "qxl", "-spice", "port=5903,disable-ticketing,addr=127.0.0.1"]
        );

        fx.options.listen_any = true;
        let args = info(&fx, &data);
        assert_eq!(args.last().unwrap(), "port=5903,disable-ticketing");

        let mut vnc = data.clone();
        vnc.vm.spice = false;
        let args = info(&fx, &vnc);
        assert_eq!(args[args.len() - 2..], ["-vnc", ":3"]);
    }

    #[test]
    fn test_macvtap_abort_reported() {
        let fx = Fixture::new();
        let mut data = fx.add_vm(web());
        data.interfaces[0].macvtap = crate::runtime::types::MacvtapMode::Private;

        let err = fx
            .compiler()
            .compile(&data, CompileMode::Run, LaunchFlags::default())
            .unwrap_err();
        assert!(matches!(err, VmrigError::Aborted(AbortReason::MacvtapParentNotSet(_))));

        let args = info(&fx, &data);
        assert!(args.contains(&"tap,id=netdev0,fd=-1".to_string()));
    }
}
