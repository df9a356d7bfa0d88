//! Device matching and the open HID channel.
//!
//! The matcher walks every enumerated HID interface once, opens the first
//! one whose vendor/product IDs match and whose handles and capabilities can
//! all be acquired, and hands back an owned [`HidChannel`].

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::transport::{
    AccessMode, DeviceCandidate, HidHandle, HidHost, ReportCapabilities, TransportError,
};

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Device not found: VID={vendor_id:04X} PID={product_id:04X}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// An opened HID interface with separate read and write handles.
///
/// Report lengths are fixed when the channel is opened. Dropping the channel
/// (or calling [`HidChannel::close`]) releases both handles.
pub struct HidChannel<H: HidHandle> {
    vendor_id: u16,
    product_id: u16,
    path: String,
    capabilities: ReportCapabilities,
    reader: H,
    writer: H,
}

impl<H: HidHandle> HidChannel<H> {
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn capabilities(&self) -> ReportCapabilities {
        self.capabilities
    }

    pub fn input_report_len(&self) -> usize {
        self.capabilities.input_report_len
    }

    pub fn output_report_len(&self) -> usize {
        self.capabilities.output_report_len
    }

    pub(crate) fn write_report(&self, report: &[u8]) -> Result<(), TransportError> {
        self.writer.write_report(report)
    }

    pub(crate) fn read_report(&self) -> Result<Vec<u8>, TransportError> {
        self.reader.read_report(self.capabilities.input_report_len)
    }

    /// Release both handles now.
    pub fn close(self) {
        debug!(path = %self.path, "Closing HID channel");
    }
}

/// Every HID interface the host currently exposes.
pub fn list_devices<T: HidHost>(host: &T) -> Result<Vec<DeviceCandidate>, MatchError> {
    Ok(host.candidates()?.collect())
}

/// Open the first usable HID interface matching `vendor_id` / `product_id`.
///
/// Candidates whose handles cannot be opened, or whose capabilities cannot
/// be queried, are skipped.
#[instrument(level = "info", skip(host), fields(vid = %format!("{:04X}", vendor_id), pid = %format!("{:04X}", product_id)))]
pub fn open_device<T: HidHost>(
    host: &T,
    vendor_id: u16,
    product_id: u16,
) -> Result<HidChannel<T::Handle>, MatchError> {
    for candidate in host.candidates()? {
        if candidate.vendor_id != vendor_id || candidate.product_id != product_id {
            continue;
        }

        match open_candidate(host, &candidate) {
            Ok(channel) => {
                info!(
                    path = %channel.path,
                    input_len = channel.input_report_len(),
                    output_len = channel.output_report_len(),
                    "Found device"
                );
                return Ok(channel);
            }
            Err(e) => {
                warn!(path = %candidate.path, error = %e, "Skipping unusable device");
            }
        }
    }

    Err(MatchError::DeviceNotFound {
        vendor_id,
        product_id,
    })
}

fn open_candidate<T: HidHost>(
    host: &T,
    candidate: &DeviceCandidate,
) -> Result<HidChannel<T::Handle>, TransportError> {
    let reader = host.open(&candidate.path, AccessMode::Read)?;
    let writer = host.open(&candidate.path, AccessMode::Write)?;
    let capabilities = reader.capabilities()?;

    Ok(HidChannel {
        vendor_id: candidate.vendor_id,
        product_id: candidate.product_id,
        path: candidate.path.clone(),
        capabilities,
        reader,
        writer,
    })
}
