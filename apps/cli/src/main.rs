use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glowusb_core::config::{Command, LightshowConfig, Overrides, usb_id_from_int};
use glowusb_core::session::{ExitStatus, Session};
use glowusb_core::transport::NusbHost;
use glowusb_core::list_devices;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "GlowUSB lightshow transfer tool (Pure Rust)", long_about = None)]
struct Args {
    /// Path to the lightshow config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// USB vendor ID (decimal, negative 16-bit, or 0x-prefixed hex)
    #[arg(long, global = true, allow_negative_numbers = true, value_parser = parse_usb_id)]
    vendor_id: Option<u16>,

    /// USB product ID (decimal, negative 16-bit, or 0x-prefixed hex)
    #[arg(long, global = true, allow_negative_numbers = true, value_parser = parse_usb_id)]
    product_id: Option<u16>,

    /// Packet size in bytes
    #[arg(long, global = true, allow_negative_numbers = true)]
    packet_size: Option<i64>,

    /// Hex payload, overriding the one in the config file
    #[arg(long, global = true)]
    packets: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum CliCommand {
    /// Download a lightshow to the device
    Download,
    /// Start the stored lightshow
    Start,
    /// Pause the running lightshow
    Stop,
    /// Resume a paused lightshow
    Resume,
    /// List attached HID interfaces
    List,
}

fn parse_usb_id(s: &str) -> Result<u16, String> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => s.parse::<i64>(),
    }
    .map_err(|e| format!("invalid USB ID '{s}': {e}"))?;

    usb_id_from_int(value).ok_or_else(|| format!("USB ID '{s}' out of range"))
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let status = match args.command {
        CliCommand::List => list(),
        CliCommand::Download => transfer(&args, Command::Download),
        CliCommand::Start => transfer(&args, Command::Start),
        CliCommand::Stop => transfer(&args, Command::Stop),
        CliCommand::Resume => transfer(&args, Command::Resume),
    };

    std::process::exit(status.code());
}

fn list() -> ExitStatus {
    match list_devices(&NusbHost::new()) {
        Ok(devices) => {
            for device in devices {
                println!("{device}");
            }
            ExitStatus::Success
        }
        Err(e) => {
            error!("Error: {}", e);
            ExitStatus::DeviceNotFound
        }
    }
}

fn load_config(args: &Args) -> Result<LightshowConfig> {
    match &args.config {
        Some(path) => LightshowConfig::load_from_file(path),
        None => Ok(LightshowConfig::default()),
    }
}

fn transfer(args: &Args, command: Command) -> ExitStatus {
    let overrides = Overrides {
        vendor_id: args.vendor_id,
        product_id: args.product_id,
        packet_size: args.packet_size,
        packets: args.packets.clone(),
    };

    let config = match load_config(args).and_then(|file| {
        file.resolve(command, &overrides)
            .context("incomplete configuration")
    }) {
        Ok(config) => config,
        Err(e) => {
            error!("Error: {:#}", e);
            return ExitStatus::InvalidConfig;
        }
    };

    info!(
        command = %command,
        vid = %format!("{:04X}", config.vendor_id),
        pid = %format!("{:04X}", config.product_id),
        "Starting GlowUSB transfer (nusb backend)..."
    );

    match Session::new(config).run(&NusbHost::new()) {
        Ok(report) => report.exit_status(),
        Err(e) => {
            error!("Error: {}", e);
            e.exit_status()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usb_id() {
        assert_eq!(parse_usb_id("4660"), Ok(0x1234));
        assert_eq!(parse_usb_id("0x5678"), Ok(0x5678));
        assert_eq!(parse_usb_id("-1"), Ok(0xFFFF));
        assert!(parse_usb_id("70000").is_err());
        assert!(parse_usb_id("abc").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "glowusb",
            "--config",
            "show.toml",
            "download",
            "--vendor-id",
            "0x1234",
            "-v",
        ])
        .unwrap();
        assert!(matches!(args.command, CliCommand::Download));
        assert_eq!(args.vendor_id, Some(0x1234));
        assert!(args.verbose);
    }

    #[test]
    fn test_missing_config_is_invalid_config() {
        let args = Args::try_parse_from(["glowusb", "start"]).unwrap();
        assert_eq!(transfer(&args, Command::Start), ExitStatus::InvalidConfig);
    }
}
