//! Lightshow configuration.
//!
//! A TOML file names the device and carries one payload per command:
//!
//! ```toml
//! usb_vendor_id = 4660
//! usb_product_id = 22136
//! usb_packet_byte_len = 4
//! download_lightshow_packets = "01,02,03,04"
//! start_lightshow_packets = "10,00,00,00"
//! ```
//!
//! Command-line values override file values field by field.

use std::fmt;

use anyhow::{Context, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::session::SessionConfig;
use crate::transfer::TransferPolicy;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing {0}: set it in the config file or on the command line")]
    Missing(&'static str),
}

/// Lightshow command sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Store a new lightshow.
    Download,
    /// Start the stored lightshow.
    Start,
    /// Pause the running lightshow.
    Stop,
    /// Resume a paused lightshow.
    Resume,
}

impl Command {
    /// Downloads end with a second break packet so the device leaves store mode.
    pub fn sends_trailing_break(&self) -> bool {
        matches!(self, Command::Download)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Download => write!(f, "download"),
            Command::Start => write!(f, "start"),
            Command::Stop => write!(f, "stop"),
            Command::Resume => write!(f, "resume"),
        }
    }
}

/// Contents of a lightshow configuration file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightshowConfig {
    #[serde(deserialize_with = "deserialize_usb_id")]
    pub usb_vendor_id: Option<u16>,
    #[serde(deserialize_with = "deserialize_usb_id")]
    pub usb_product_id: Option<u16>,
    pub usb_packet_byte_len: Option<i64>,
    pub download_lightshow_packets: Option<String>,
    pub start_lightshow_packets: Option<String>,
    pub pause_lightshow_packets: Option<String>,
    pub resume_lightshow_packets: Option<String>,
}

/// Map a signed or unsigned 16-bit integer onto a USB ID.
///
/// Negative values are read as 16-bit two's complement, so `-1` is `0xFFFF`.
pub fn usb_id_from_int(value: i64) -> Option<u16> {
    match value {
        -32768..=-1 => Some(value as i16 as u16),
        0..=0xFFFF => Some(value as u16),
        _ => None,
    }
}

fn deserialize_usb_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u16>, D::Error> {
    Option::<i64>::deserialize(deserializer)?
        .map(|value| {
            usb_id_from_int(value)
                .ok_or_else(|| D::Error::custom(format!("USB ID {value} out of range")))
        })
        .transpose()
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub packet_size: Option<i64>,
    pub packets: Option<String>,
}

impl LightshowConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: LightshowConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Payload blob configured for `command`.
    pub fn packets_for(&self, command: Command) -> Option<&str> {
        match command {
            Command::Download => self.download_lightshow_packets.as_deref(),
            Command::Start => self.start_lightshow_packets.as_deref(),
            Command::Stop => self.pause_lightshow_packets.as_deref(),
            Command::Resume => self.resume_lightshow_packets.as_deref(),
        }
    }

    /// Merge with command-line overrides into a session configuration.
    pub fn resolve(
        &self,
        command: Command,
        overrides: &Overrides,
    ) -> Result<SessionConfig, ConfigError> {
        let vendor_id = overrides
            .vendor_id
            .or(self.usb_vendor_id)
            .ok_or(ConfigError::Missing("vendor ID"))?;
        let product_id = overrides
            .product_id
            .or(self.usb_product_id)
            .ok_or(ConfigError::Missing("product ID"))?;
        let packet_size = overrides
            .packet_size
            .or(self.usb_packet_byte_len)
            .ok_or(ConfigError::Missing("packet byte size"))?;
        let payload = overrides
            .packets
            .as_deref()
            .or_else(|| self.packets_for(command))
            .ok_or(ConfigError::Missing("packet list"))?
            .to_string();

        Ok(SessionConfig {
            vendor_id,
            product_id,
            packet_size,
            payload,
            command,
            policy: TransferPolicy::default(),
        })
    }
}
