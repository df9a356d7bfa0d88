//! Protocol module - GlowUSB report and status definitions.

pub mod constants;
pub mod descriptor;
pub mod status;

pub use constants::*;
pub use descriptor::{DescriptorError, ReportLengths, parse_report_lengths};
pub use status::{DeviceStatus, StatusError, StatusLayout};
