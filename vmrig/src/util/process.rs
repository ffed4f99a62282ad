//! Hypervisor process checks: pidfiles, liveness and termination.

use std::path::Path;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use vmrig_shared::errors::{VmrigError, VmrigResult};

/// Send SIGTERM to a process.
///
/// # Returns
/// * `true` - Signal delivered or process already gone
/// * `false` - Failed to signal (permission denied)
pub fn terminate_process(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    signal::kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok() || !is_process_alive(pid)
}

/// Check if a process with the given PID exists.
///
/// Sends the null signal. Permission errors count as "not alive".
pub fn is_process_alive(pid: u32) -> bool {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => signal::kill(Pid::from_raw(raw), None).is_ok(),
        _ => false,
    }
}

/// Read the PID QEMU wrote with `-pidfile`.
///
/// A missing file yields `None`; unparsable content is an error.
pub fn read_pid_file(path: &Path) -> VmrigResult<Option<u32>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    raw.trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|_| VmrigError::InvalidState(format!("bad pidfile {}", path.display())))
}

/// Verify that a PID is a QEMU instance started for `vm_dir`.
///
/// Guards against PID reuse after the hypervisor exited without removing
/// its pidfile.
pub fn is_same_process(pid: u32, vm_dir: &Path) -> bool {
    #[cfg(target_os = "linux")]
    {
        let cmdline = match std::fs::read(format!("/proc/{}/cmdline", pid)) {
            Ok(raw) => raw,
            Err(_) => return false,
        };
        let cmdline = String::from_utf8_lossy(&cmdline);
        let dir = vm_dir.to_string_lossy();

        cmdline.split('\0').any(|arg| arg.contains("qemu-system")) && cmdline.contains(&*dir)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = vm_dir;
        is_process_alive(pid)
    }
}
