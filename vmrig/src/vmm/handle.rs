//! Handle on a running hypervisor, found through its pidfile.

use vmrig_shared::errors::{VmrigError, VmrigResult};

use crate::runtime::layout::VmLayout;
use crate::util::{is_process_alive, is_same_process, read_pid_file, terminate_process};

/// Runtime operations on a VM that is already running.
///
/// Created by [`QemuHandle::attach`]; nothing is kept in memory between
/// invocations, the pidfile is the source of truth.
#[derive(Debug, Clone)]
pub struct QemuHandle {
    pid: u32,
    layout: VmLayout,
}

impl QemuHandle {
    /// Attach to the hypervisor of `layout`, if one is alive.
    pub fn attach(layout: &VmLayout) -> VmrigResult<Option<Self>> {
        let Some(pid) = read_pid_file(&layout.pid_file())? else {
            return Ok(None);
        };

        if !is_process_alive(pid) || !is_same_process(pid, layout.dir()) {
            tracing::debug!(pid, dir = %layout.dir().display(), "Ignoring stale pidfile");
            return Ok(None);
        }

        Ok(Some(Self {
            pid,
            layout: layout.clone(),
        }))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        is_process_alive(self.pid)
    }

    /// Ask QEMU to shut down with SIGTERM.
    pub fn stop(&self) -> VmrigResult<()> {
        if !terminate_process(self.pid) {
            return Err(VmrigError::Internal(format!(
                "failed to signal hypervisor pid {}",
                self.pid
            )));
        }
        tracing::info!(pid = self.pid, dir = %self.layout.dir().display(), "Sent SIGTERM to hypervisor");
        Ok(())
    }
}
