//! vmrig: a local QEMU virtual machine manager.
//!
//! VM definitions live in SQLite ([`db`]). Starting a VM compiles its
//! record into an ordered QEMU command line ([`plan`]), preparing host tap
//! and macvtap devices ([`net`]) and resolving USB passthrough devices
//! ([`usb`]) on the way, then runs the hypervisor ([`vmm`]).
//! [`VmrigRuntime`] ties these together.

pub mod db;
pub mod net;
pub mod plan;
pub mod runtime;
pub mod usb;
pub mod util;
pub mod vmm;

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use runtime::layout::FilesystemLayout;
pub use runtime::options::VmrigOptions;
pub use runtime::types::{DriveKind, NewVm, VmData};
pub use runtime::{StartOptions, VmInfo, VmrigRuntime};
pub use vmrig_shared::{AbortReason, VmrigError, VmrigResult};

use runtime::constants::filenames;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Send tracing output to `<home>/logs/vmrig.log`.
///
/// Filtered by `RUST_LOG`, `info` by default. Calling it again, or after
/// another global subscriber was installed, does nothing.
pub fn init_logging_for(layout: &FilesystemLayout) -> VmrigResult<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let logs_dir = layout.logs_dir();
    std::fs::create_dir_all(&logs_dir)?;

    let appender = tracing_appender::rolling::never(&logs_dir, filenames::TRACE_LOG);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let installed = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .is_ok();

    if installed {
        let _ = LOG_GUARD.set(guard);
    }
    Ok(())
}
