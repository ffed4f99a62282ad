//! Runtime facade: one context object owning store, host backends and
//! launcher.

pub mod constants;
pub mod layout;
pub mod options;
pub mod types;

use std::io::ErrorKind;
use std::path::Path;

use vmrig_shared::errors::{VmrigError, VmrigResult};

use crate::db::{Database, VmStore};
use crate::init_logging_for;
use crate::net::{self, NetController, NetDeviceManager};
use crate::plan::{CompileMode, LaunchFlags, LaunchPlan, PlanCompiler};
use crate::usb::{SysfsUsbEnumerator, UsbEnumerator};
use crate::vmm::{LaunchOutcome, ProcessLauncher, QemuHandle};

use layout::FilesystemLayout;
use options::VmrigOptions;
use types::{NewVm, VmData};

/// Switches for [`VmrigRuntime::start`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Throw away guest disk writes.
    pub temporary: bool,
    /// The guest OS is installed: stop booting the install source.
    /// Implies a persistent run.
    pub installed: bool,
}

/// Name and state of a stored VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmInfo {
    pub name: String,
    pub running: bool,
}

pub struct VmrigRuntime {
    options: VmrigOptions,
    layout: FilesystemLayout,
    store: VmStore,
    net: Box<dyn NetController>,
    usb: Box<dyn UsbEnumerator>,
    launcher: ProcessLauncher,
}

impl VmrigRuntime {
    /// Runtime for this host: platform network controller, sysfs USB.
    pub fn new(options: VmrigOptions) -> VmrigResult<Self> {
        let net = net::default_controller(ProcessLauncher::default());
        let runtime =
            Self::with_backends(options, net, Box::new(SysfsUsbEnumerator::default()))?;
        init_logging_for(&runtime.layout)?;
        Ok(runtime)
    }

    /// Runtime with caller-supplied host backends.
    pub fn with_backends(
        options: VmrigOptions,
        net: Box<dyn NetController>,
        usb: Box<dyn UsbEnumerator>,
    ) -> VmrigResult<Self> {
        if !options.home_dir.is_absolute() {
            return Err(VmrigError::Config(format!(
                "home_dir must be absolute path, got: {}",
                options.home_dir.display()
            )));
        }

        let layout = FilesystemLayout::from_options(&options);
        prepare(&layout)?;

        let db = Database::open(&layout.db_path()).map_err(|e| {
            VmrigError::Storage(format!(
                "Failed to initialize database at {}: {}",
                layout.db_path().display(),
                e
            ))
        })?;
        let launcher = ProcessLauncher::new(options.resolved_last_error_path());

        tracing::debug!(home = %layout.home_dir().display(), "initialized runtime");

        Ok(Self {
            options,
            layout,
            store: VmStore::new(db),
            net,
            usb,
            launcher,
        })
    }

    pub fn options(&self) -> &VmrigOptions {
        &self.options
    }

    pub fn layout(&self) -> &FilesystemLayout {
        &self.layout
    }

    pub fn store(&self) -> &VmStore {
        &self.store
    }

    fn compiler(&self) -> PlanCompiler<'_> {
        PlanCompiler::new(
            &self.options,
            &self.layout,
            &self.store,
            self.net.as_ref(),
            self.usb.as_ref(),
        )
    }

    pub fn list(&self) -> VmrigResult<Vec<VmInfo>> {
        Ok(self
            .store
            .list_names()?
            .into_iter()
            .map(|name| VmInfo {
                running: self.layout.vm(&name).is_running(),
                name,
            })
            .collect())
    }

    /// Register a VM, create its directory and boot disk image.
    pub fn create(&self, new: &NewVm) -> VmrigResult<VmData> {
        let data = self.store.create(new)?;
        let vm_layout = self.layout.vm(&new.name);

        std::fs::create_dir_all(vm_layout.dir()).map_err(|e| {
            VmrigError::Storage(format!(
                "cannot create VM directory {}: {}",
                vm_layout.dir().display(),
                e
            ))
        })?;

        let qemu_img = self.options.qemu_prefix.join("bin").join("qemu-img");
        for drive in &data.drives {
            let argv = vec![
                qemu_img.display().to_string(),
                "create".to_string(),
                "-f".to_string(),
                "qcow2".to_string(),
                vm_layout.drive_path(&drive.file_name).display().to_string(),
                format!("{}G", drive.capacity_gb),
            ];
            if let LaunchOutcome::Failure(output) = self.launcher.launch(&argv, Vec::new(), false)? {
                return Err(VmrigError::Storage(format!(
                    "cannot create image {}: {}",
                    drive.file_name,
                    output.trim_end()
                )));
            }
        }

        tracing::info!(vm = %new.name, "Created VM directory and disk");
        Ok(data)
    }

    /// Compile and launch a VM.
    ///
    /// Precondition failures come back as [`VmrigError::Aborted`]; a
    /// hypervisor that exits non-zero as [`VmrigError::LaunchFailed`].
    pub fn start(&self, name: &str, opts: StartOptions) -> VmrigResult<()> {
        let vm_layout = self.layout.vm(name);
        if vm_layout.is_running() {
            return Err(VmrigError::InvalidState(format!("vm {} is already running", name)));
        }

        if opts.installed {
            self.store.mark_installed(name)?;
        }
        let data = self.store.load(name)?;
        let flags = LaunchFlags {
            temporary: opts.temporary && !opts.installed,
        };

        let compiled = self.compiler().compile(&data, CompileMode::Run, flags)?;
        let command_line = compiled.plan.to_string();
        tracing::info!(vm = %name, temporary = flags.temporary, "Starting VM");
        tracing::debug!(vm = %name, "{}", command_line);

        match self
            .launcher
            .launch(compiled.plan.args(), compiled.tap_fds, false)?
        {
            LaunchOutcome::Success(_) => {
                self.launcher.record_command(&command_line);
                tracing::info!(vm = %name, "VM started");
                Ok(())
            }
            LaunchOutcome::Failure(output) => {
                remove_if_exists(&vm_layout.qmp_socket());
                Err(VmrigError::LaunchFailed { output })
            }
        }
    }

    /// The command line `start` would run, without touching the host.
    pub fn command_line(&self, name: &str) -> VmrigResult<LaunchPlan> {
        let data = self.store.load(name)?;
        let compiled = self
            .compiler()
            .compile(&data, CompileMode::Info, LaunchFlags::default())?;
        Ok(compiled.plan)
    }

    pub fn is_running(&self, name: &str) -> VmrigResult<bool> {
        if !self.store.exists(name)? {
            return Err(VmrigError::NotFound(format!("vm {}", name)));
        }
        Ok(self.layout.vm(name).is_running())
    }

    /// Send SIGTERM to the VM's hypervisor.
    pub fn kill(&self, name: &str) -> VmrigResult<()> {
        if !self.store.exists(name)? {
            return Err(VmrigError::NotFound(format!("vm {}", name)));
        }

        let handle = QemuHandle::attach(&self.layout.vm(name))?
            .ok_or_else(|| VmrigError::InvalidState(format!("vm {} is not running", name)))?;
        handle.stop()
    }

    /// Remove a stopped VM: files, host interfaces and store rows.
    ///
    /// Returns `false` when some files could not be removed; the store
    /// rows are deleted regardless.
    pub fn delete(&self, name: &str) -> VmrigResult<bool> {
        let vm_layout = self.layout.vm(name);
        if vm_layout.is_running() {
            return Err(VmrigError::InvalidState(format!(
                "cannot delete running vm {}",
                name
            )));
        }
        let data = self.store.load(name)?;

        let mut complete = true;
        for drive in &data.drives {
            complete &= remove_if_exists(&vm_layout.drive_path(&drive.file_name));
        }
        complete &= remove_if_exists(&vm_layout.pid_file());
        complete &= remove_if_exists(&vm_layout.qmp_socket());

        match std::fs::remove_dir(vm_layout.dir()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    vm = %name,
                    path = %vm_layout.dir().display(),
                    error = %e,
                    "Failed to remove VM directory"
                );
                complete = false;
            }
        }

        if let Err(e) = NetDeviceManager::new(self.net.as_ref()).remove_all(&data.interfaces) {
            tracing::warn!(vm = %name, error = %e, "Failed to remove host interfaces");
        }

        self.store.delete(name)?;
        tracing::info!(vm = %name, complete, "Deleted VM");
        Ok(complete)
    }

    /// Delete host interfaces of every VM that is not running.
    pub fn clear_stale_interfaces(&self) -> VmrigResult<bool> {
        let cleared =
            NetDeviceManager::new(self.net.as_ref()).clear_stale(&self.store, &self.layout)?;
        if cleared {
            tracing::info!("Removed stale host interfaces");
        }
        Ok(cleared)
    }
}

fn prepare(layout: &FilesystemLayout) -> VmrigResult<()> {
    layout.prepare().map_err(|e| {
        VmrigError::Storage(format!(
            "Failed to initialize filesystem at {}: {}",
            layout.home_dir().display(),
            e
        ))
    })
}

/// Remove a file; a missing file counts as removed.
fn remove_if_exists(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::TapPolicy;
    use crate::net::testing::FakeNetController;
    use crate::runtime::types::DriveKind;
    use crate::usb::testing::CountingUsbEnumerator;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Creates the QMP socket named on its command line like QEMU would,
    /// then runs `tail`.
    fn fake_qemu(prefix: &Path, tail: &str) {
        let script = format!(
            "#!/bin/sh\n\
             for a in \"$@\"; do case \"$a\" in unix:*) p=\"${{a#unix:}}\"; : > \"${{p%%,*}}\";; esac; done\n\
             {}\n",
            tail
        );
        install_script(prefix, "qemu-system-x86_64", &script);
    }

    fn install_script(prefix: &Path, name: &str, body: &str) {
        let bin = prefix.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let path = bin.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn runtime(dir: &TempDir) -> VmrigRuntime {
        let options = VmrigOptions {
            home_dir: dir.path().join("home"),
            vm_dir: PathBuf::from("vms"),
            qemu_prefix: dir.path().join("qemu"),
            ..VmrigOptions::default()
        };
        install_script(&options.qemu_prefix, "qemu-img", "#!/bin/sh\n: > \"$4\"\n");
        VmrigRuntime::with_backends(
            options,
            Box::new(FakeNetController::new(TapPolicy::Precreate)),
            Box::new(CountingUsbEnumerator::new()),
        )
        .unwrap()
    }

    fn new_vm(name: &str) -> NewVm {
        NewVm {
            name: name.to_string(),
            arch: "x86_64".to_string(),
            cpus: 1,
            memory_mb: 512,
            disk_gb: 4,
            drive_kind: DriveKind::Virtio,
            install_source: String::new(),
            iface_count: 1,
            net_driver: "e1000".to_string(),
            kvm: false,
            usb_enabled: false,
            spice: false,
        }
    }

    #[test]
    fn test_relative_home_rejected() {
        let options = VmrigOptions {
            home_dir: PathBuf::from("relative/home"),
            ..VmrigOptions::default()
        };
        let result = VmrigRuntime::with_backends(
            options,
            Box::new(FakeNetController::new(TapPolicy::Precreate)),
            Box::new(CountingUsbEnumerator::new()),
        );
        assert!(matches!(result, Err(VmrigError::Config(_))));
    }

    #[test]
    fn test_relative_home_creates_nothing() {
        let cwd = std::env::current_dir().unwrap();
        let home = PathBuf::from(format!("vmrig-rel-{}", std::process::id()));
        let options = VmrigOptions {
            home_dir: home.clone(),
            ..VmrigOptions::default()
        };

        assert!(matches!(
            VmrigRuntime::new(options),
            Err(VmrigError::Config(_))
        ));
        assert!(!cwd.join(&home).exists());
    }

    #[test]
    fn test_create_makes_disk_image() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);

        rt.create(&new_vm("alpine")).unwrap();

        let vm = rt.layout().vm("alpine");
        assert!(vm.drive_path("alpine_a.img").exists());
        assert_eq!(
            rt.list().unwrap(),
            vec![VmInfo {
                name: "alpine".into(),
                running: false
            }]
        );
    }

    #[test]
    fn test_command_line_matches_layout() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        rt.create(&new_vm("alpine")).unwrap();

        let plan = rt.command_line("alpine").unwrap();
        let args = plan.args();
        let qmp = rt.layout().vm("alpine").qmp_socket();

        assert_eq!(
            args[0],
            dir.path().join("qemu/bin/qemu-system-x86_64").display().to_string()
        );
        assert!(args.contains(&format!("unix:{},server,nowait", qmp.display())));
        assert!(args.contains(&"e1000,mac=de:ad:00:00:00:01,netdev=netdev0".to_string()));
    }

    #[test]
    fn test_start_success_and_running() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        rt.create(&new_vm("alpine")).unwrap();
        fake_qemu(&dir.path().join("qemu"), "exit 0");

        rt.start("alpine", StartOptions::default()).unwrap();
        assert!(rt.is_running("alpine").unwrap());

        let last = rt.options().resolved_last_error_path().unwrap();
        let logged = std::fs::read_to_string(last).unwrap();
        let qemu = dir.path().join("qemu/bin/qemu-system-x86_64");
        assert!(logged.starts_with(&qemu.display().to_string()));
        assert!(logged.contains("tap,ifname=alpine_eth0,script=no,downscript=no,id=netdev0"));

        let again = rt.start("alpine", StartOptions::default());
        assert!(matches!(again, Err(VmrigError::InvalidState(_))));
        assert!(matches!(rt.delete("alpine"), Err(VmrigError::InvalidState(_))));
    }

    #[test]
    fn test_start_failure_cleans_qmp_and_logs() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        rt.create(&new_vm("alpine")).unwrap();
        fake_qemu(&dir.path().join("qemu"), "echo 'boom' >&2\nexit 1");

        let err = rt.start("alpine", StartOptions::default()).unwrap_err();

        match err {
            VmrigError::LaunchFailed { output } => assert_eq!(output, "boom\n"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!rt.is_running("alpine").unwrap());
        let last = rt.options().resolved_last_error_path().unwrap();
        assert_eq!(std::fs::read_to_string(last).unwrap(), "boom\n");
    }

    #[test]
    fn test_start_installed_clears_install_flag() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        let mut vm = new_vm("alpine");
        vm.install_source = "/iso/alpine.iso".into();
        rt.create(&vm).unwrap();
        fake_qemu(&dir.path().join("qemu"), "exit 0");

        assert!(rt.store().get_vm("alpine").unwrap().unwrap().install);
        let opts = StartOptions {
            temporary: true,
            installed: true,
        };
        // The ISO is gone from disk, so the non-install path aborts.
        let err = rt.start("alpine", opts).unwrap_err();
        assert!(err.is_abort());
        assert!(!rt.store().get_vm("alpine").unwrap().unwrap().install);
    }

    #[test]
    fn test_kill_requires_running_vm() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        rt.create(&new_vm("alpine")).unwrap();

        assert!(matches!(rt.kill("alpine"), Err(VmrigError::InvalidState(_))));
        assert!(matches!(rt.kill("ghost"), Err(VmrigError::NotFound(_))));
    }

    #[test]
    fn test_delete_removes_everything() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        rt.create(&new_vm("alpine")).unwrap();
        let vm_dir = rt.layout().vm("alpine").dir().to_path_buf();

        assert!(rt.delete("alpine").unwrap());
        assert!(!vm_dir.exists());
        assert!(!rt.store().exists("alpine").unwrap());
    }

    #[test]
    fn test_clear_stale_interfaces_without_hosts() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        rt.create(&new_vm("alpine")).unwrap();

        assert!(!rt.clear_stale_interfaces().unwrap());
    }
}
