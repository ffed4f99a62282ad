//! Hypervisor process management.

mod handle;
mod launcher;

pub use handle::QemuHandle;
pub use launcher::{LaunchOutcome, ProcessLauncher};
