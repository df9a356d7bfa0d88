//! Report exchange and the poll-until-ready loops.
//!
//! A packet is written once as an output report; afterwards only input
//! reports are read until the device reports the state the packet waits for,
//! the poll cap is reached, or an I/O error occurs.

use std::fmt;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace, warn};

use super::machine::{PacketKind, PacketTransfer, Readiness, TransferPhase};
use crate::device::HidChannel;
use crate::protocol::constants::{MAX_POLL_ATTEMPTS, POLL_INTERVAL, REPORT_ID, REPORT_ID_LEN};
use crate::protocol::{DeviceStatus, StatusError, StatusLayout};
use crate::transport::{HidHandle, TransportError};

/// Direction of a HID report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Input,
    Output,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Input => write!(f, "input"),
            ReportKind::Output => write!(f, "output"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("{kind} report length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        kind: ReportKind,
        expected: usize,
        actual: usize,
    },

    #[error("Device does not support input reports")]
    InputUnsupported,

    #[error("I/O error: {0}")]
    Io(#[from] TransportError),

    #[error("Device still busy after {polls} polls ({last_status})")]
    BusyTimeout { polls: u32, last_status: DeviceStatus },

    #[error("Device not in control mode ({status})")]
    UnexpectedStatus { status: DeviceStatus },

    #[error("Bad status report: {0}")]
    Status(#[from] StatusError),
}

/// Timing and decoding parameters for packet transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Pause between two status polls while busy.
    pub poll_interval: Duration,
    /// Status reads per packet, the first read included.
    pub max_polls: u32,
    pub status_layout: StatusLayout,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            max_polls: MAX_POLL_ATTEMPTS,
            status_layout: StatusLayout::default(),
        }
    }
}

/// Result of a packet that reached `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketReport {
    pub kind: PacketKind,
    /// Busy polls seen before the device became ready.
    pub retries: u32,
    /// The status that completed the packet.
    pub status: DeviceStatus,
}

/// Build an output report: report ID followed by `payload`, which must fill
/// the device's output report exactly.
pub fn build_output_report(
    payload: &[u8],
    output_report_len: usize,
) -> Result<Vec<u8>, TransferError> {
    let actual = payload.len() + REPORT_ID_LEN;
    if actual != output_report_len {
        return Err(TransferError::LengthMismatch {
            kind: ReportKind::Output,
            expected: output_report_len,
            actual,
        });
    }
    let mut report = Vec::with_capacity(actual);
    report.push(REPORT_ID);
    report.extend_from_slice(payload);
    Ok(report)
}

fn write_packet<H: HidHandle>(channel: &HidChannel<H>, payload: &[u8]) -> Result<(), TransferError> {
    let report = build_output_report(payload, channel.output_report_len())?;
    trace!(report = ?report, "Writing output report");
    channel.write_report(&report)?;
    Ok(())
}

/// Read one input report and decode the device status from it.
pub fn poll_status<H: HidHandle>(
    channel: &HidChannel<H>,
    layout: &StatusLayout,
) -> Result<DeviceStatus, TransferError> {
    let expected = channel.input_report_len();
    if expected == 0 {
        return Err(TransferError::InputUnsupported);
    }

    let report = channel.read_report()?;
    if report.len() != expected {
        return Err(TransferError::LengthMismatch {
            kind: ReportKind::Input,
            expected,
            actual: report.len(),
        });
    }

    let status = layout.decode(&report)?;
    trace!(status = %status, "Status report");
    Ok(status)
}

/// Write one output report carrying `payload`, then read one status report.
pub fn exchange<H: HidHandle>(
    channel: &HidChannel<H>,
    payload: &[u8],
    layout: &StatusLayout,
) -> Result<DeviceStatus, TransferError> {
    write_packet(channel, payload)?;
    poll_status(channel, layout)
}

/// Send a break packet and wait until the device is idle and in control mode.
pub fn send_break<H: HidHandle>(
    channel: &HidChannel<H>,
    packet: &[u8],
    policy: &TransferPolicy,
) -> Result<PacketReport, TransferError> {
    send_packet(channel, PacketKind::Break, packet, policy)
}

/// Send a data packet and wait until the device has finished writing it.
pub fn send_data<H: HidHandle>(
    channel: &HidChannel<H>,
    packet: &[u8],
    policy: &TransferPolicy,
) -> Result<PacketReport, TransferError> {
    send_packet(channel, PacketKind::Data, packet, policy)
}

fn send_packet<H: HidHandle>(
    channel: &HidChannel<H>,
    kind: PacketKind,
    packet: &[u8],
    policy: &TransferPolicy,
) -> Result<PacketReport, TransferError> {
    let mut transfer = PacketTransfer::new();
    let result = drive(channel, kind, packet, policy, &mut transfer);
    if result.is_err() {
        transfer.goto_phase(TransferPhase::Failed);
    }
    result
}

fn drive<H: HidHandle>(
    channel: &HidChannel<H>,
    kind: PacketKind,
    packet: &[u8],
    policy: &TransferPolicy,
    transfer: &mut PacketTransfer,
) -> Result<PacketReport, TransferError> {
    let layout = &policy.status_layout;

    let mut status = exchange(channel, packet, layout)?;
    transfer.goto_phase(TransferPhase::Sent);
    let mut polls = 1;

    loop {
        match kind.readiness(&status) {
            Readiness::Ready => {
                transfer.goto_phase(TransferPhase::Ready);
                let retries = polls - 1;
                debug!(kind = %kind, retries, "Sent successfully");
                return Ok(PacketReport {
                    kind,
                    retries,
                    status,
                });
            }
            Readiness::Rejected => {
                warn!(kind = %kind, status = %status, "Device answered outside control mode");
                return Err(TransferError::UnexpectedStatus { status });
            }
            Readiness::Busy(reason) => {
                transfer.goto_phase(TransferPhase::Busy);
                debug!(
                    kind = %kind,
                    poll = polls,
                    "{}, recheck in {}ms",
                    reason,
                    policy.poll_interval.as_millis()
                );
                thread::sleep(policy.poll_interval);

                if polls >= policy.max_polls {
                    warn!(kind = %kind, polls, status = %status, "Device stayed busy");
                    return Err(TransferError::BusyTimeout {
                        polls,
                        last_status: status,
                    });
                }
                status = poll_status(channel, layout)?;
                polls += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::open_device;
    use crate::protocol::constants::{CONTROL_FLAG, STORE_FLAG};
    use crate::transport::{MockHandle, MockHidHost, SimulatedDevice};

    fn fast_policy() -> TransferPolicy {
        TransferPolicy {
            poll_interval: Duration::ZERO,
            ..TransferPolicy::default()
        }
    }

    fn setup(report_len: usize) -> (SimulatedDevice, HidChannel<MockHandle>) {
        let device = SimulatedDevice::new(0x1234, 0x5678, "sim-0")
            .with_capabilities(report_len, report_len);
        let host = MockHidHost::new().with_device(device.clone());
        let channel = open_device(&host, 0x1234, 0x5678).unwrap();
        (device, channel)
    }

    #[test]
    fn test_build_output_report() {
        assert_eq!(
            build_output_report(&[1, 2, 3, 4], 5).unwrap(),
            vec![0, 1, 2, 3, 4]
        );
        assert!(matches!(
            build_output_report(&[1, 2, 3], 5),
            Err(TransferError::LengthMismatch {
                kind: ReportKind::Output,
                expected: 5,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_exchange_writes_report_and_decodes_status() {
        let (device, channel) = setup(5);
        device.queue_status(true, false, STORE_FLAG);

        let status = exchange(&channel, &[9, 8, 7, 6], &StatusLayout::default()).unwrap();
        assert!(status.animation_active);
        assert!(!status.control_mode);
        assert_eq!(device.writes(), vec![vec![0, 9, 8, 7, 6]]);
    }

    #[test]
    fn test_length_mismatch_never_reaches_device() {
        let (device, channel) = setup(5);
        let err = send_data(&channel, &[1, 2], &fast_policy()).unwrap_err();
        assert!(matches!(err, TransferError::LengthMismatch { .. }));
        assert!(device.writes().is_empty());
        assert_eq!(device.reads(), 0);
    }

    #[test]
    fn test_short_input_report_is_length_mismatch() {
        let (device, channel) = setup(5);
        device.queue_report(&[0, 0, 0]);
        assert!(matches!(
            send_data(&channel, &[1, 2, 3, 4], &fast_policy()),
            Err(TransferError::LengthMismatch {
                kind: ReportKind::Input,
                expected: 5,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_break_ready_after_three_busy_polls() {
        let (device, channel) = setup(5);
        device.queue_status(true, false, CONTROL_FLAG);
        device.queue_status(false, true, CONTROL_FLAG);
        device.queue_status(true, true, CONTROL_FLAG);
        device.queue_status(false, false, CONTROL_FLAG);

        let report = send_break(&channel, &[0xFF; 4], &fast_policy()).unwrap();
        assert_eq!(report.kind, PacketKind::Break);
        assert_eq!(report.retries, 3);
        assert_eq!(device.reads(), 4);
        // Only the initial write; polls are reads.
        assert_eq!(device.writes().len(), 1);
    }

    #[test]
    fn test_break_busy_timeout() {
        let (device, channel) = setup(5);
        device.queue_status_n(20, true, false, CONTROL_FLAG);

        let err = send_break(&channel, &[0xFF; 4], &fast_policy()).unwrap_err();
        assert!(matches!(err, TransferError::BusyTimeout { polls: 10, .. }));
        assert_eq!(device.reads(), 10);
    }

    #[test]
    fn test_break_rejected_outside_control_mode() {
        let (device, channel) = setup(5);
        device.queue_status(false, false, STORE_FLAG);
        assert!(matches!(
            send_break(&channel, &[0xFF; 4], &fast_policy()),
            Err(TransferError::UnexpectedStatus { .. })
        ));
    }

    #[test]
    fn test_data_waits_for_memory_write() {
        let (device, channel) = setup(5);
        device.queue_status_n(2, false, true, STORE_FLAG);
        device.queue_status(true, false, STORE_FLAG);

        let report = send_data(&channel, &[1, 2, 3, 4], &fast_policy()).unwrap();
        assert_eq!(report.retries, 2);
        assert!(report.status.animation_active);
    }

    #[test]
    fn test_data_busy_timeout_respects_policy() {
        let (device, channel) = setup(5);
        device.queue_status_n(10, false, true, STORE_FLAG);
        let policy = TransferPolicy {
            max_polls: 3,
            ..fast_policy()
        };
        assert!(matches!(
            send_data(&channel, &[1, 2, 3, 4], &policy),
            Err(TransferError::BusyTimeout { polls: 3, .. })
        ));
        assert_eq!(device.reads(), 3);
    }

    #[test]
    fn test_read_failure_is_io_error() {
        let (_device, channel) = setup(5);
        assert!(matches!(
            send_data(&channel, &[1, 2, 3, 4], &fast_policy()),
            Err(TransferError::Io(_))
        ));
    }

    #[test]
    fn test_read_failure_while_busy_is_io_error() {
        let (device, channel) = setup(5);
        device.queue_status(false, true, STORE_FLAG);

        assert!(matches!(
            send_data(&channel, &[1, 2, 3, 4], &fast_policy()),
            Err(TransferError::Io(TransportError::ReadFailed(_)))
        ));
        assert_eq!(device.reads(), 1);
        assert_eq!(device.writes().len(), 1);
    }

    #[test]
    fn test_write_failure_is_io_error() {
        let (device, channel) = setup(5);
        device.queue_status(false, false, CONTROL_FLAG);
        device.disconnect();

        assert!(matches!(
            send_break(&channel, &[0xFF; 4], &fast_policy()),
            Err(TransferError::Io(TransportError::Disconnected))
        ));
        assert!(device.writes().is_empty());
        assert_eq!(device.reads(), 0);
    }

    #[test]
    fn test_input_unsupported() {
        let device = SimulatedDevice::new(0x1234, 0x5678, "sim-0").with_capabilities(0, 5);
        let host = MockHidHost::new().with_device(device.clone());
        let channel = open_device(&host, 0x1234, 0x5678).unwrap();
        assert!(matches!(
            send_data(&channel, &[1, 2, 3, 4], &fast_policy()),
            Err(TransferError::InputUnsupported)
        ));
    }
}
