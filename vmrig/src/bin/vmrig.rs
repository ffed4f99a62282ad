//! Command line front end for vmrig.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use vmrig::runtime::constants::net::DEFAULT_DRIVER;
use vmrig::{DriveKind, NewVm, StartOptions, VmrigError, VmrigOptions, VmrigRuntime};

#[derive(Parser)]
#[command(name = "vmrig", version, about = "Manage local QEMU virtual machines")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List VMs and whether they run.
    List,

    /// Create a VM with one boot disk.
    Create {
        name: String,
        #[arg(long, default_value = "x86_64")]
        arch: String,
        #[arg(long, default_value_t = 1)]
        cpus: u32,
        /// Memory in MB.
        #[arg(long, default_value_t = 512)]
        memory: u32,
        /// Disk size in GB.
        #[arg(long, default_value_t = 10)]
        disk: u32,
        #[arg(long, default_value = "virtio")]
        drive: DriveKind,
        /// ISO or disk image to install from.
        #[arg(long)]
        install: Option<String>,
        #[arg(long, default_value_t = 1)]
        ifaces: u32,
        #[arg(long, default_value = DEFAULT_DRIVER)]
        net_driver: String,
        #[arg(long)]
        kvm: bool,
        #[arg(long)]
        usb: bool,
    },

    /// Start a VM.
    Start {
        name: String,
        /// Discard disk writes on shutdown.
        #[arg(long)]
        temp: bool,
        /// Installation finished; boot from disk from now on.
        #[arg(long)]
        installed: bool,
    },

    /// Print the QEMU command line of a VM.
    Cmdline { name: String },

    /// Send SIGTERM to a running VM.
    Kill { name: String },

    /// Delete a stopped VM and its files.
    Delete { name: String },

    /// Remove host interfaces of VMs that are not running.
    ClearTaps,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let options = match &cli.config {
        Some(path) => VmrigOptions::load(path)?,
        None => VmrigOptions::default(),
    };
    let runtime = VmrigRuntime::new(options).context("failed to initialize vmrig")?;

    match cli.command {
        Command::List => {
            for vm in runtime.list()? {
                let state = if vm.running { "running" } else { "stopped" };
                println!("{:<32} {}", vm.name, state);
            }
        }
        Command::Create {
            name,
            arch,
            cpus,
            memory,
            disk,
            drive,
            install,
            ifaces,
            net_driver,
            kvm,
            usb,
        } => {
            let new = NewVm {
                name,
                arch,
                cpus,
                memory_mb: memory,
                disk_gb: disk,
                drive_kind: drive,
                install_source: install.unwrap_or_default(),
                iface_count: ifaces,
                net_driver,
                kvm,
                usb_enabled: usb,
                spice: runtime.options().spice_default,
            };
            let data = runtime.create(&new)?;
            println!("{} created (vnc display {})", data.vm.name, data.vm.vnc);
        }
        Command::Start {
            name,
            temp,
            installed,
        } => {
            let opts = StartOptions {
                temporary: temp,
                installed,
            };
            match runtime.start(&name, opts) {
                Ok(()) => println!("{} started", name),
                Err(VmrigError::Aborted(reason)) => {
                    eprintln!("warning: {}", reason);
                    return Ok(ExitCode::FAILURE);
                }
                Err(VmrigError::LaunchFailed { .. }) => {
                    match runtime.options().resolved_last_error_path() {
                        Some(log) => eprintln!(
                            "warning: {} failed to start, see {}",
                            name,
                            log.display()
                        ),
                        None => eprintln!("warning: {} failed to start", name),
                    }
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e).with_context(|| format!("cannot start {}", name)),
            }
        }
        Command::Cmdline { name } => {
            println!("{}", runtime.command_line(&name)?);
        }
        Command::Kill { name } => {
            runtime.kill(&name)?;
        }
        Command::Delete { name } => {
            if !runtime.delete(&name)? {
                eprintln!("warning: some files of {} were left behind", name);
            }
        }
        Command::ClearTaps => {
            if runtime.clear_stale_interfaces()? {
                println!("stale interfaces removed");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
