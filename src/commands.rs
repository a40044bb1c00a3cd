//! Command handlers behind the `bento` command line.
//!
//! Argument parsing lives in the binary; these take already-typed arguments
//! and write user output to `out`. A missing bento is reported with an info
//! log and treated as success.

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::{LaunchOptions, SyncOptions};
use crate::error::{BentoError, Result};
use crate::poll::{CancelToken, PollPolicy};
use crate::system::BentoSystem;

pub const DEFAULT_BENTO_NAME: &str = "bento";

/// Post-start synchronization flags shared by create, start and config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncArgs {
    pub skip_hosts_edit: bool,
    pub skip_config_write: bool,
    pub hosts_file: Option<PathBuf>,
    pub output_config_dir: Option<PathBuf>,
}

impl SyncArgs {
    pub fn to_sync_options(&self) -> SyncOptions {
        SyncOptions {
            sync_hosts: !self.skip_hosts_edit,
            sync_config: !self.skip_config_write,
            config_dir: self.output_config_dir.clone(),
            hosts_path: self.hosts_file.clone(),
        }
    }
}

/// Overrides for the settings' poll policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollArgs {
    pub poll_interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

impl PollArgs {
    fn resolve(&self, system: &BentoSystem) -> Result<PollPolicy> {
        let settings = system.settings();
        PollPolicy::from_millis(
            self.poll_interval_ms.unwrap_or(settings.poll_interval_ms),
            self.timeout_ms.unwrap_or(settings.timeout_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateArgs {
    pub name: String,
    pub platform_version: Option<String>,
    /// Leave the new container stopped.
    pub no_start: bool,
    pub sync: SyncArgs,
    pub poll: PollArgs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartArgs {
    pub name: String,
    pub sync: SyncArgs,
    pub poll: PollArgs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigArgs {
    pub name: String,
    pub hosts_file: Option<PathBuf>,
    pub output_config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(CreateArgs),
    Rm { name: String },
    List { all: bool },
    Start(StartArgs),
    Stop { name: String, poll: PollArgs },
    Status { name: String },
    Info { name: String },
    Pull { platform_version: Option<String> },
    Ip { name: String },
    Hostname { name: String },
    Logs { name: String },
    Config(ConfigArgs),
}

impl Command {
    /// Bento the command targets, if any.
    pub fn bento_name(&self) -> Option<&str> {
        match self {
            Self::Create(args) => Some(args.name.as_str()),
            Self::Start(args) => Some(args.name.as_str()),
            Self::Config(args) => Some(args.name.as_str()),
            Self::Rm { name }
            | Self::Stop { name, .. }
            | Self::Status { name }
            | Self::Info { name }
            | Self::Ip { name }
            | Self::Hostname { name }
            | Self::Logs { name } => Some(name.as_str()),
            Self::List { .. } | Self::Pull { .. } => None,
        }
    }
}

/// Dispatch `command`. NotFound for the targeted bento becomes Ok.
pub fn run(system: &BentoSystem, command: &Command, out: &mut dyn Write) -> Result<()> {
    let result = match command {
        Command::Create(args) => create(system, args, out),
        Command::Rm { name } => rm(system, name),
        Command::List { all } => list(system, *all, out),
        Command::Start(args) => start(system, args),
        Command::Stop { name, poll } => stop(system, name, poll),
        Command::Status { name } => status(system, name, out),
        Command::Info { name } => info(system, name, out),
        Command::Pull { platform_version } => pull(system, platform_version.as_deref()),
        Command::Ip { name } => ip(system, name, out),
        Command::Hostname { name } => hostname(system, name, out),
        Command::Logs { name } => logs(system, name, out),
        Command::Config(args) => config(system, args),
    };
    match (result, command.bento_name()) {
        (Err(e), Some(name)) if e.is_not_found() => {
            log::info!("Bento does not exist: {}", name);
            Ok(())
        }
        (result, _) => result,
    }
}

fn write_err(e: std::io::Error) -> BentoError {
    BentoError::io(format!("Failed to write output: {}", e))
}

pub fn create(system: &BentoSystem, args: &CreateArgs, out: &mut dyn Write) -> Result<()> {
    let launch = LaunchOptions {
        start: !args.no_start,
        sync: args.sync.to_sync_options(),
        poll: args.poll.resolve(system)?,
    };
    let record = system.create(
        &args.name,
        args.platform_version.as_deref(),
        &launch,
        &CancelToken::new(),
    )?;
    writeln!(out, "{}", record.container_id).map_err(write_err)
}

pub fn rm(system: &BentoSystem, name: &str) -> Result<()> {
    system.delete(name)
}

#[derive(Serialize)]
struct ListEntry<'a> {
    ip: &'a str,
    name: &'a str,
}

pub fn list(system: &BentoSystem, all: bool, out: &mut dyn Write) -> Result<()> {
    let records = system.list(!all)?;
    writeln!(out, "Bentos:").map_err(write_err)?;
    for record in records {
        let line = serde_json::to_string(&ListEntry {
            ip: &record.address,
            name: &record.hostname,
        })?;
        writeln!(out, "  {}", line).map_err(write_err)?;
    }
    Ok(())
}

pub fn start(system: &BentoSystem, args: &StartArgs) -> Result<()> {
    let policy = args.poll.resolve(system)?;
    system
        .instance(&args.name)?
        .start(&args.sync.to_sync_options(), &policy, &CancelToken::new())?;
    Ok(())
}

pub fn stop(system: &BentoSystem, name: &str, poll: &PollArgs) -> Result<()> {
    let policy = poll.resolve(system)?;
    system.instance(name)?.stop(&policy, &CancelToken::new())?;
    Ok(())
}

fn started(flag: bool) -> &'static str {
    if flag {
        "started"
    } else {
        "stopped"
    }
}

pub fn status(system: &BentoSystem, name: &str, out: &mut dyn Write) -> Result<()> {
    let instance = system.instance(name)?;
    let container_running = instance.is_container_running()?;
    let services_running = container_running && instance.is_running()?;
    writeln!(out, "Bento container {}.", started(container_running)).map_err(write_err)?;
    writeln!(out, "Bento services {}.", started(services_running)).map_err(write_err)
}

pub fn info(system: &BentoSystem, name: &str, out: &mut dyn Write) -> Result<()> {
    let doc = system.instance(name)?.info()?;
    writeln!(out, "{}", serde_json::to_string_pretty(&doc)?).map_err(write_err)
}

pub fn pull(system: &BentoSystem, platform_version: Option<&str>) -> Result<()> {
    system.pull(platform_version)
}

pub fn ip(system: &BentoSystem, name: &str, out: &mut dyn Write) -> Result<()> {
    let address = system.instance(name)?.ip_address()?;
    writeln!(out, "{}", address).map_err(write_err)
}

pub fn hostname(system: &BentoSystem, name: &str, out: &mut dyn Write) -> Result<()> {
    let hostname = system.instance(name)?.hostname()?;
    writeln!(out, "{}", hostname).map_err(write_err)
}

pub fn logs(system: &BentoSystem, name: &str, out: &mut dyn Write) -> Result<()> {
    let log = system.instance(name)?.get_log()?;
    out.write_all(&log).map_err(write_err)
}

/// Rewrite client config and the hosts entry for a running bento.
pub fn config(system: &BentoSystem, args: &ConfigArgs) -> Result<()> {
    let instance = system.instance(&args.name)?;
    instance.write_hadoop_config(args.output_config_dir.clone())?;
    instance.update_hosts(args.hosts_file.clone())?;
    Ok(())
}
