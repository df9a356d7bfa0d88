//! HID transport layer abstraction.
//!
//! Defines the `HidHost` and `HidHandle` traits for HID communication,
//! allowing different implementations (nusb, mock, etc.).

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("No device at path {0}")]
    NoSuchPath(String),

    #[error("Failed to open {path}: {message}")]
    OpenFailed { path: String, message: String },

    #[error("Failed to query capabilities: {0}")]
    CapabilitiesFailed(String),

    #[error("Handle opened for {mode} access cannot {operation}")]
    WrongAccessMode {
        mode: AccessMode,
        operation: &'static str,
    },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,
}

/// Direction a handle is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "read"),
            AccessMode::Write => write!(f, "write"),
        }
    }
}

/// One enumerated HID interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Backend-specific path used to open the interface.
    pub path: String,
}

impl fmt::Display for DeviceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X}:{:04X} at {}",
            self.vendor_id, self.product_id, self.path
        )
    }
}

/// Report lengths as reported by the device, report-ID byte included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCapabilities {
    pub input_report_len: usize,
    pub output_report_len: usize,
}

/// An open handle on one HID interface.
pub trait HidHandle {
    /// Query the report lengths of the interface.
    fn capabilities(&self) -> Result<ReportCapabilities, TransportError>;

    /// Send one output report. `report[0]` is the report ID.
    fn write_report(&self, report: &[u8]) -> Result<(), TransportError>;

    /// Fetch one input report of `len` bytes, report ID first.
    fn read_report(&self, len: usize) -> Result<Vec<u8>, TransportError>;
}

/// Source of HID interfaces.
///
/// This trait enables:
/// - Production implementation using nusb
/// - Mock implementation for unit testing
pub trait HidHost {
    type Handle: HidHandle;

    /// Lazily enumerate every HID interface currently attached.
    fn candidates(
        &self,
    ) -> Result<Box<dyn Iterator<Item = DeviceCandidate> + '_>, TransportError>;

    /// Open the interface at `path`.
    fn open(&self, path: &str, mode: AccessMode) -> Result<Self::Handle, TransportError>;
}
