//! Protocol constants for the GlowUSB lightshow firmware.
//!
//! Values mirror what the device firmware expects on its HID interface.

use std::time::Duration;

// ============================================================================
// Reports
// ============================================================================

/// Report ID prefixed to every output report. The firmware uses a single,
/// unnumbered report, so this is always zero.
pub const REPORT_ID: u8 = 0x00;

/// Number of bytes the report-ID prefix occupies in a report buffer.
pub const REPORT_ID_LEN: usize = 1;

/// Fill byte of a break packet.
pub const BREAK_FILL: u8 = 0xFF;

/// Largest packet size the configuration may request.
pub const MAX_PACKET_SIZE: usize = 255;

// ============================================================================
// Status report layout
// ============================================================================

/// Input report offset of the "animation running" flag.
pub const STATUS_ANIMATION_OFFSET: usize = 1;

/// Input report offset of the "flash write in progress" flag.
pub const STATUS_MEMORY_WRITE_OFFSET: usize = 2;

/// Input report offset of the device mode byte.
pub const STATUS_MODE_OFFSET: usize = 3;

/// Mode byte reported while the device accepts control packets.
pub const CONTROL_FLAG: u8 = 0;

/// Mode byte reported while the device is storing a lightshow.
pub const STORE_FLAG: u8 = 1;

// ============================================================================
// Polling
// ============================================================================

/// Delay between two status polls while the device is busy.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Status reads allowed per packet before giving up.
pub const MAX_POLL_ATTEMPTS: u32 = 10;

// ============================================================================
// HID class requests (HID 1.11, section 7.2)
// ============================================================================

/// USB interface class code for HID.
pub const HID_INTERFACE_CLASS: u8 = 0x03;

/// Class request: GET_REPORT.
pub const HID_REQ_GET_REPORT: u8 = 0x01;

/// Class request: SET_REPORT.
pub const HID_REQ_SET_REPORT: u8 = 0x09;

/// Report type (high byte of wValue) for input reports.
pub const HID_REPORT_TYPE_INPUT: u8 = 0x01;

/// Report type (high byte of wValue) for output reports.
pub const HID_REPORT_TYPE_OUTPUT: u8 = 0x02;

/// Standard request: GET_DESCRIPTOR.
pub const USB_REQ_GET_DESCRIPTOR: u8 = 0x06;

/// Descriptor type of a HID report descriptor.
pub const HID_DESCRIPTOR_TYPE_REPORT: u8 = 0x22;

/// Upper bound for a report descriptor fetch.
pub const MAX_REPORT_DESCRIPTOR_LEN: u16 = 4096;

/// Timeout for a single control transfer.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(1);

/// Build the `wValue` of a GET_REPORT / SET_REPORT request.
#[inline]
pub const fn report_request_value(report_type: u8, report_id: u8) -> u16 {
    ((report_type as u16) << 8) | report_id as u16
}
