use clap::{Args, Subcommand};
use std::path::PathBuf;

use ibucm_channel::{DeviceConfig, DEFAULT_DEVICE_PATH};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod doctor;
pub mod listen;
pub mod probe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen on a service id and print connection manager events.
    Listen(ListenArgs),
    /// Create a handle, print its attributes and destroy it.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Doctor(args) => doctor::run(args, format),
    }
}

#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Connection manager device node.
    #[arg(long, env = "IBUCM_DEVICE", default_value = DEFAULT_DEVICE_PATH)]
    pub device: PathBuf,
}

impl DeviceArgs {
    pub fn config(&self) -> DeviceConfig {
        DeviceConfig::with_path(self.device.clone())
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Service id to listen on (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_u64)]
    pub service_id: u64,
    /// Mask applied to the service id.
    #[arg(long, value_parser = parse_u64, default_value = "0xffffffffffffffff")]
    pub mask: u64,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    /// Reject inbound requests with this reason code instead of leaving them
    /// pending.
    #[arg(long, value_name = "REASON")]
    pub reject: Option<u32>,
    /// Event poll interval (e.g. 200ms, 1s).
    #[arg(long, default_value = "250ms", value_parser = parse_duration)]
    pub poll: std::time::Duration,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended version information.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}

pub fn parse_u64(value: &str) -> Result<u64, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|err| format!("invalid value {value:?}: {err}"))
}

pub fn parse_duration(value: &str) -> Result<std::time::Duration, String> {
    let value = value.trim();
    let (number, unit) = value
        .find(|c: char| !c.is_ascii_digit())
        .map_or((value, "ms"), |idx| value.split_at(idx));
    let amount: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration {value:?}"))?;
    match unit {
        "ms" => Ok(std::time::Duration::from_millis(amount)),
        "s" => Ok(std::time::Duration::from_secs(amount)),
        _ => Err(format!("invalid duration unit in {value:?} (use ms or s)")),
    }
}
