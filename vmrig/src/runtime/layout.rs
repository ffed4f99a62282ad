//! Filesystem layout of the vmrig home and VM directories.
//!
//! ```text
//! ~/.vmrig/
//! ├── db/vmrig.db
//! ├── logs/{vmrig.log,last.log}
//! └── vms/<name>/
//!     ├── <name>_a.img
//!     ├── qemu.pid
//!     └── qmp.sock
//! ```

use std::path::{Path, PathBuf};

use crate::runtime::constants::{dirs, filenames};
use crate::runtime::options::VmrigOptions;

#[derive(Debug, Clone)]
pub struct FilesystemLayout {
    home_dir: PathBuf,
    vm_dir: PathBuf,
}

impl FilesystemLayout {
    pub fn new(home_dir: PathBuf, vm_dir: PathBuf) -> Self {
        Self { home_dir, vm_dir }
    }

    pub fn from_options(options: &VmrigOptions) -> Self {
        Self::new(options.home_dir.clone(), options.resolved_vm_dir())
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn db_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::DB)
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir().join(filenames::DATABASE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::LOGS)
    }

    pub fn vms_dir(&self) -> &Path {
        &self.vm_dir
    }

    /// Layout of a single VM directory.
    pub fn vm(&self, name: &str) -> VmLayout {
        VmLayout::new(self.vm_dir.join(name))
    }

    /// Create the directories vmrig writes into.
    pub fn prepare(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.home_dir)?;
        std::fs::create_dir_all(self.db_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(&self.vm_dir)?;
        Ok(())
    }
}

/// Paths inside one VM directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmLayout {
    dir: PathBuf,
}

impl VmLayout {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn drive_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.dir.join(filenames::PID_FILE)
    }

    pub fn qmp_socket(&self) -> PathBuf {
        self.dir.join(filenames::QMP_SOCKET)
    }

    /// A VM counts as running while its QMP socket exists.
    pub fn is_running(&self) -> bool {
        self.qmp_socket().exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_paths() {
        let layout = FilesystemLayout::new(PathBuf::from("/h"), PathBuf::from("/h/vms"));
        let vm = layout.vm("alpine");

        assert_eq!(vm.dir(), Path::new("/h/vms/alpine"));
        assert_eq!(vm.pid_file(), PathBuf::from("/h/vms/alpine/qemu.pid"));
        assert_eq!(vm.qmp_socket(), PathBuf::from("/h/vms/alpine/qmp.sock"));
        assert_eq!(
            vm.drive_path("alpine_a.img"),
            PathBuf::from("/h/vms/alpine/alpine_a.img")
        );
        assert_eq!(layout.db_path(), PathBuf::from("/h/db/vmrig.db"));
    }

    #[test]
    fn test_prepare_creates_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = FilesystemLayout::new(tmp.path().join("home"), tmp.path().join("home/vms"));
        layout.prepare().unwrap();

        assert!(layout.db_dir().is_dir());
        assert!(layout.logs_dir().is_dir());
        assert!(layout.vms_dir().is_dir());
        assert!(!layout.vm("x").is_running());
    }
}
