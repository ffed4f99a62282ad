//! Reconcile one interface record with host state before a launch.

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::unistd::{AccessFlags, access, geteuid};

use vmrig_shared::errors::{AbortReason, VmrigError, VmrigResult};

use super::{NetController, TapPolicy};
use crate::db::VmStore;
use crate::plan::CompileMode;
use crate::runtime::constants::net::{TAP_PERMISSION_ATTEMPTS, TAP_PERMISSION_INTERVAL_MS};
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::types::{InterfaceRecord, MacvtapMode};
use crate::util::Spinner;

/// How the hypervisor reaches an interface's host device.
#[derive(Debug)]
pub enum NetdevBinding {
    /// Plain tap opened by the hypervisor from `ifname=`.
    TapName,
    /// Open macvtap character device, inherited by the hypervisor.
    Descriptor(OwnedFd),
    /// Stand-in for a descriptor when nothing is opened.
    Placeholder,
}

impl NetdevBinding {
    /// Value of the `-netdev` flag for interface number `index`.
    pub fn netdev_arg(&self, iface: &InterfaceRecord, index: usize) -> String {
        let mut arg = match self {
            NetdevBinding::TapName => format!(
                "tap,ifname={},script=no,downscript=no,id=netdev{}",
                iface.name, index
            ),
            NetdevBinding::Descriptor(fd) => {
                format!("tap,id=netdev{},fd={}", index, fd.as_raw_fd())
            }
            NetdevBinding::Placeholder => format!("tap,id=netdev{},fd=-1", index),
        };
        if iface.vhost {
            arg.push_str(",vhost=on");
        }
        arg
    }

    /// Take the descriptor out, if any.
    pub fn into_fd(self) -> Option<OwnedFd> {
        match self {
            NetdevBinding::Descriptor(fd) => Some(fd),
            _ => None,
        }
    }
}

pub struct NetDeviceManager<'a> {
    net: &'a dyn NetController,
    dev_dir: PathBuf,
    permission_attempts: u32,
    permission_interval: Duration,
}

impl<'a> NetDeviceManager<'a> {
    pub fn new(net: &'a dyn NetController) -> Self {
        Self {
            net,
            dev_dir: PathBuf::from("/dev"),
            permission_attempts: TAP_PERMISSION_ATTEMPTS,
            permission_interval: Duration::from_millis(TAP_PERMISSION_INTERVAL_MS),
        }
    }

    /// Look for `tap<index>` character devices under `dev_dir`.
    pub fn with_dev_dir(mut self, dev_dir: impl Into<PathBuf>) -> Self {
        self.dev_dir = dev_dir.into();
        self
    }

    /// Poll a new tap device `attempts` times, `interval` apart, for
    /// read/write access.
    pub fn with_permission_wait(mut self, attempts: u32, interval: Duration) -> Self {
        self.permission_attempts = attempts;
        self.permission_interval = interval;
        self
    }

    /// Make the host device for `iface` ready.
    ///
    /// `Info` never touches the host.
    pub fn ensure(&self, iface: &InterfaceRecord, mode: CompileMode) -> VmrigResult<NetdevBinding> {
        match (mode, iface.macvtap) {
            (CompileMode::Info, MacvtapMode::Disabled) => Ok(NetdevBinding::TapName),
            (CompileMode::Info, _) => Ok(NetdevBinding::Placeholder),
            (CompileMode::Run, MacvtapMode::Disabled) => {
                self.ensure_tap(iface)?;
                Ok(NetdevBinding::TapName)
            }
            (CompileMode::Run, macvtap) => self
                .ensure_macvtap(iface, macvtap)
                .map(NetdevBinding::Descriptor),
        }
    }

    fn ensure_tap(&self, iface: &InterfaceRecord) -> VmrigResult<()> {
        let name = iface.name.as_str();

        if self.net.exists(name) && self.net.is_macvtap(name) {
            tracing::info!(iface = %name, "Replacing macvtap with plain tap");
            self.net.delete_iface(name)?;
        }

        match self.net.tap_policy() {
            TapPolicy::Precreate => {
                if !self.net.exists(name) {
                    self.net.create_tap(name)?;
                    if let Some(addr) = &iface.ipv4 {
                        self.net.set_ipv4(name, addr)?;
                    }
                    if let Some(altname) = &iface.altname {
                        self.net.set_altname(name, altname)?;
                    }
                }
            }
            TapPolicy::LeaveToHypervisor => {
                if self.net.exists(name) {
                    self.net.delete_tap(name)?;
                }
            }
        }
        Ok(())
    }

    fn ensure_macvtap(&self, iface: &InterfaceRecord, mode: MacvtapMode) -> VmrigResult<OwnedFd> {
        let name = iface.name.as_str();

        if !self.net.supports_macvtap() {
            return Err(VmrigError::Unsupported(format!(
                "macvtap interface {} on a platform without macvtap",
                name
            )));
        }

        if self.net.exists(name) && !self.net.is_macvtap(name) {
            tracing::info!(iface = %name, "Replacing plain tap with macvtap");
            self.net.delete_tap(name)?;
        }

        let mut created = false;
        if !self.net.exists(name) {
            let parent = iface
                .parent
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| AbortReason::MacvtapParentNotSet(name.to_string()))?;

            self.net.create_macvtap(name, parent, &iface.mac, mode)?;
            if let Some(altname) = &iface.altname {
                self.net.set_altname(name, altname)?;
            }
            created = true;
        }

        let index = self.net.index(name).ok_or_else(|| {
            VmrigError::Network(format!("cannot resolve interface index of {}", name))
        })?;
        let path = self.dev_dir.join(format!("tap{}", index));

        // udev applies device permissions asynchronously after creation.
        if created && !geteuid().is_root() {
            let mut spinner = Spinner::start(format!("Waiting for {}", path.display()));
            self.wait_for_permission(&path, &mut spinner)?;
        }

        open_inheritable(&path)
    }

    /// Stops `spinner` once access is granted or polling gives up.
    fn wait_for_permission(&self, path: &Path, spinner: &mut Spinner) -> VmrigResult<()> {
        let granted = (0..self.permission_attempts).any(|attempt| {
            if attempt > 0 {
                thread::sleep(self.permission_interval);
            }
            access(path, AccessFlags::R_OK | AccessFlags::W_OK).is_ok()
        });
        spinner.stop();

        if granted {
            Ok(())
        } else {
            tracing::warn!(path = %path.display(), "Tap permission not granted");
            Err(AbortReason::TapPermissionTimeout(path.to_path_buf()).into())
        }
    }

    /// Delete host interfaces of every VM that is not running.
    ///
    /// Returns whether anything was removed.
    pub fn clear_stale(&self, store: &VmStore, layout: &FilesystemLayout) -> VmrigResult<bool> {
        let mut cleared = false;
        for name in store.list_names()? {
            if layout.vm(&name).is_running() {
                continue;
            }
            cleared |= self.remove_all(&store.interfaces(&name)?)?;
        }
        Ok(cleared)
    }

    /// Delete the host interfaces that exist for `ifaces`.
    pub fn remove_all(&self, ifaces: &[InterfaceRecord]) -> VmrigResult<bool> {
        let mut removed = false;
        for iface in ifaces {
            if self.net.exists(&iface.name) {
                self.net.delete_iface(&iface.name)?;
                removed = true;
            }
        }
        Ok(removed)
    }
}


/// Open a tap character device and keep it across `exec`.
fn open_inheritable(path: &Path) -> VmrigResult<OwnedFd> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| VmrigError::Network(format!("cannot open {}: {}", path.display(), e)))?;

    fcntl(&file, FcntlArg::F_SETFD(FdFlag::empty())).map_err(|e| {
        VmrigError::Network(format!("cannot clear FD_CLOEXEC on {}: {}", path.display(), e))
    })?;

    Ok(OwnedFd::from(file))
}
