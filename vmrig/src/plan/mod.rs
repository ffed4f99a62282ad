//! Launch plans: the ordered QEMU argument list for one VM start.

mod compiler;

use std::fmt;
use std::os::fd::OwnedFd;

pub use compiler::PlanCompiler;

/// Whether compilation may touch the host and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    /// Prepare devices, persist bookkeeping, enforce launch-time checks.
    Run,
    /// Side-effect free rendering for display.
    Info,
}

/// Per-launch switches that are not part of the VM record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchFlags {
    /// Discard guest disk writes (`-snapshot`).
    pub temporary: bool,
}

/// Ordered, append-only argument vector. `args()[0]` is the executable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchPlan {
    args: Vec<String>,
}

impl LaunchPlan {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            args: vec![executable.into()],
        }
    }

    pub fn push(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    /// Append a flag followed by its value.
    pub fn flag(&mut self, flag: &str, value: impl Into<String>) {
        self.push(flag);
        self.push(value);
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}

impl fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// A plan plus the descriptors the hypervisor has to inherit.
#[derive(Debug)]
pub struct CompiledPlan {
    pub plan: LaunchPlan,
    pub tap_fds: Vec<OwnedFd>,
}
