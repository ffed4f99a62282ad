//! Hypervisor and helper process spawning.

use std::io::{ErrorKind, Read};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use vmrig_shared::errors::{VmrigError, VmrigResult};

/// Result of running a command to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Exit status zero; carries the combined output when capture was requested.
    Success(Option<String>),
    /// Non-zero exit or killed by a signal; carries the combined output.
    Failure(String),
}

/// Poll interval of the output reader once the child may have exited.
const READ_POLL: Duration = Duration::from_millis(50);

/// Spawns commands with stdout and stderr joined on one socket.
///
/// The caller blocks until the direct child exits. With `-daemonize`
/// that happens once QEMU has finished initializing.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    last_error_log: Option<PathBuf>,
}

impl ProcessLauncher {
    /// `last_error_log` receives the output of every failed launch and
    /// the command line of every successful VM start.
    pub fn new(last_error_log: Option<PathBuf>) -> Self {
        Self { last_error_log }
    }

    /// Run `argv` and wait for it to exit.
    ///
    /// `inherited` are descriptors the child must keep (tap fds without
    /// `FD_CLOEXEC`); they are closed in this process once the child has
    /// been spawned, whatever the outcome.
    pub fn launch(
        &self,
        argv: &[String],
        inherited: Vec<OwnedFd>,
        capture: bool,
    ) -> VmrigResult<LaunchOutcome> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| VmrigError::InvalidState("empty command line".into()))?;

        let (mut parent_end, child_end) = UnixStream::pair()?;
        let mut reader_end = parent_end.try_clone()?;
        reader_end.set_read_timeout(Some(READ_POLL))?;
        let child_out = OwnedFd::from(child_end);
        let child_err = child_out.try_clone()?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(child_out))
            .stderr(Stdio::from(child_err));

        let spawned = cmd.spawn();
        // Our copies of the child end must go, or the drain below never sees EOF.
        drop(cmd);
        drop(inherited);

        let mut child = spawned.map_err(|e| {
            let err_msg = format!("Failed to spawn {}: {}", program, e);
            tracing::error!("{}", err_msg);
            VmrigError::Engine(err_msg)
        })?;

        let exited = Arc::new(AtomicBool::new(false));
        let reader = {
            let exited = Arc::clone(&exited);
            thread::spawn(move || collect(&mut reader_end, &exited))
        };

        let status = child.wait();
        exited.store(true, Ordering::Release);
        let mut bytes = reader
            .join()
            .map_err(|_| VmrigError::Internal("output reader panicked".into()))??;
        let status = status?;
        bytes.extend(drain(&mut parent_end)?);
        let output = String::from_utf8_lossy(&bytes).into_owned();

        if status.success() {
            tracing::debug!(program = %program, "Command succeeded");
            return Ok(LaunchOutcome::Success(capture.then_some(output)));
        }

        tracing::error!(
            program = %program,
            status = %describe(status),
            "Command failed: {}",
            output.trim_end()
        );
        self.write_last_log(&output);
        Ok(LaunchOutcome::Failure(output))
    }

    /// Run a helper command and return its output.
    pub fn run_capture(&self, program: &str, args: &[&str]) -> VmrigResult<LaunchOutcome> {
        let argv: Vec<String> = std::iter::once(program)
            .chain(args.iter().copied())
            .map(String::from)
            .collect();
        self.launch(&argv, Vec::new(), true)
    }

    /// Record the command line of a launch that succeeded.
    pub fn record_command(&self, command_line: &str) {
        self.write_last_log(command_line);
    }

    fn write_last_log(&self, output: &str) {
        let Some(path) = &self.last_error_log else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(path, output) {
            tracing::warn!("Failed to write {}: {}", path.display(), e);
        }
    }
}

/// Read the child's output while it runs.
///
/// Stops at EOF, or at the first idle poll after `exited` is set.
fn collect(stream: &mut UnixStream, exited: &AtomicBool) -> std::io::Result<Vec<u8>> {
    let mut collected = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => collected.extend_from_slice(&buf[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if exited.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(collected)
}

/// Read whatever the child left on the socket without blocking.
///
/// A daemonized grandchild may still hold the write end, so EOF is not
/// guaranteed.
fn drain(stream: &mut UnixStream) -> VmrigResult<Vec<u8>> {
    stream.set_nonblocking(true)?;

    let mut collected = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => collected.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(collected)
}

fn describe(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(sig)) => format!("signal {}", sig),
        _ => "unknown".to_string(),
    }
}
