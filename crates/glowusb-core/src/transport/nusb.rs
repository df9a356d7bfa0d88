//! nusb-based HID transport implementation.
//!
//! HID reports are exchanged with class requests on the control endpoint
//! (SET_REPORT / GET_REPORT), the same path the host HID stack uses for
//! `HidD_SetOutputReport` / `HidD_GetInputReport`. Report lengths come from
//! the interface's report descriptor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, trace};

use super::traits::{
    AccessMode, DeviceCandidate, HidHandle, HidHost, ReportCapabilities, TransportError,
};
use crate::protocol::constants::{
    CONTROL_TIMEOUT, HID_DESCRIPTOR_TYPE_REPORT, HID_INTERFACE_CLASS, HID_REPORT_TYPE_INPUT,
    HID_REPORT_TYPE_OUTPUT, HID_REQ_GET_REPORT, HID_REQ_SET_REPORT, MAX_REPORT_DESCRIPTOR_LEN,
    REPORT_ID, USB_REQ_GET_DESCRIPTOR, report_request_value,
};
use crate::protocol::descriptor::parse_report_lengths;

/// nusb-backed HID host.
///
/// Read and write handles on the same path share one claimed interface;
/// the claim is released once the last handle is dropped.
#[derive(Default)]
pub struct NusbHost {
    claimed: Mutex<HashMap<String, Weak<Interface>>>,
}

impl NusbHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, path: &str) -> Result<Arc<Interface>, TransportError> {
        let mut claimed = self
            .claimed
            .lock()
            .map_err(|_| TransportError::OpenFailed {
                path: path.to_string(),
                message: "interface table poisoned".into(),
            })?;

        if let Some(interface) = claimed.get(path).and_then(Weak::upgrade) {
            return Ok(interface);
        }

        let open_err = |message: String| TransportError::OpenFailed {
            path: path.to_string(),
            message,
        };

        let (device_info, interface_number) = list_devices()
            .wait()
            .map_err(|e| TransportError::EnumerationFailed(e.to_string()))?
            .find_map(|d| {
                hid_interfaces(&d)
                    .into_iter()
                    .find(|&n| interface_path(&d, n) == path)
                    .map(|n| (d, n))
            })
            .ok_or_else(|| TransportError::NoSuchPath(path.to_string()))?;

        let device = device_info
            .open()
            .wait()
            .map_err(|e| open_err(e.to_string()))?;
        let interface = device
            .detach_and_claim_interface(interface_number)
            .wait()
            .map_err(|e| open_err(e.to_string()))?;

        info!(path = %path, interface = interface_number, "Claimed HID interface");

        let interface = Arc::new(interface);
        claimed.insert(path.to_string(), Arc::downgrade(&interface));
        Ok(interface)
    }
}

fn hid_interfaces(device: &nusb::DeviceInfo) -> Vec<u8> {
    device
        .interfaces()
        .filter(|i| i.class() == HID_INTERFACE_CLASS)
        .map(|i| i.interface_number())
        .collect()
}

fn interface_path(device: &nusb::DeviceInfo, interface_number: u8) -> String {
    format!(
        "{}-{}:{}",
        device.bus_id(),
        device.device_address(),
        interface_number
    )
}

impl HidHost for NusbHost {
    type Handle = NusbHandle;

    fn candidates(
        &self,
    ) -> Result<Box<dyn Iterator<Item = DeviceCandidate> + '_>, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::EnumerationFailed(e.to_string()))?;

        Ok(Box::new(devices.flat_map(|d| {
            hid_interfaces(&d)
                .into_iter()
                .map(|n| DeviceCandidate {
                    vendor_id: d.vendor_id(),
                    product_id: d.product_id(),
                    path: interface_path(&d, n),
                })
                .collect::<Vec<_>>()
        })))
    }

    #[instrument(level = "debug", skip(self))]
    fn open(&self, path: &str, mode: AccessMode) -> Result<NusbHandle, TransportError> {
        let interface = self.claim(path)?;
        let interface_number = path
            .rsplit(':')
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| TransportError::NoSuchPath(path.to_string()))?;

        debug!(mode = %mode, "Opened handle");
        Ok(NusbHandle {
            interface,
            interface_number,
            mode,
        })
    }
}

/// Handle on a claimed HID interface.
pub struct NusbHandle {
    interface: Arc<Interface>,
    interface_number: u8,
    mode: AccessMode,
}

impl NusbHandle {
    fn require(&self, mode: AccessMode, operation: &'static str) -> Result<(), TransportError> {
        if self.mode != mode {
            return Err(TransportError::WrongAccessMode {
                mode: self.mode,
                operation,
            });
        }
        Ok(())
    }
}

impl HidHandle for NusbHandle {
    fn capabilities(&self) -> Result<ReportCapabilities, TransportError> {
        let descriptor = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Standard,
                    recipient: Recipient::Interface,
                    request: USB_REQ_GET_DESCRIPTOR,
                    value: (HID_DESCRIPTOR_TYPE_REPORT as u16) << 8,
                    index: self.interface_number as u16,
                    length: MAX_REPORT_DESCRIPTOR_LEN,
                },
                CONTROL_TIMEOUT,
            )
            .wait()
            .map_err(|e| TransportError::CapabilitiesFailed(e.to_string()))?;

        let lengths = parse_report_lengths(&descriptor)
            .map_err(|e| TransportError::CapabilitiesFailed(e.to_string()))?;

        debug!(
            descriptor_len = descriptor.len(),
            input = lengths.input,
            output = lengths.output,
            "Parsed report descriptor"
        );

        Ok(ReportCapabilities {
            input_report_len: lengths.input,
            output_report_len: lengths.output,
        })
    }

    fn write_report(&self, report: &[u8]) -> Result<(), TransportError> {
        self.require(AccessMode::Write, "write")?;
        let (&report_id, payload) = report
            .split_first()
            .ok_or_else(|| TransportError::WriteFailed("empty report".into()))?;

        // Report ID zero means unnumbered reports: the ID byte is not sent.
        let data = if report_id == REPORT_ID { payload } else { report };

        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: HID_REQ_SET_REPORT,
                    value: report_request_value(HID_REPORT_TYPE_OUTPUT, report_id),
                    index: self.interface_number as u16,
                    data,
                },
                CONTROL_TIMEOUT,
            )
            .wait()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        trace!(len = report.len(), "SET_REPORT complete");
        Ok(())
    }

    fn read_report(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        self.require(AccessMode::Read, "read")?;
        let length = u16::try_from(len.saturating_sub(1))
            .map_err(|_| TransportError::ReadFailed(format!("report length {len} too large")))?;

        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: HID_REQ_GET_REPORT,
                    value: report_request_value(HID_REPORT_TYPE_INPUT, REPORT_ID),
                    index: self.interface_number as u16,
                    length,
                },
                CONTROL_TIMEOUT,
            )
            .wait()
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        trace!(len = data.len(), "GET_REPORT complete");

        let mut report = Vec::with_capacity(data.len() + 1);
        report.push(REPORT_ID);
        report.extend_from_slice(&data);
        Ok(report)
    }
}
