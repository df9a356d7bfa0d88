//! Device status decoding.
//!
//! Every input report carries three status bytes. They are decoded fresh on
//! each poll; nothing here is cached between reads.

use std::fmt;

use thiserror::Error;

use super::constants::{
    CONTROL_FLAG, STATUS_ANIMATION_OFFSET, STATUS_MEMORY_WRITE_OFFSET, STATUS_MODE_OFFSET,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("Status report too short: need {needed} bytes, got {actual}")]
    ShortReport { needed: usize, actual: usize },
}

/// Byte offsets of the status fields within an input report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLayout {
    pub animation_offset: usize,
    pub memory_write_offset: usize,
    pub mode_offset: usize,
    /// Mode byte value meaning "control mode".
    pub control_flag: u8,
}

impl Default for StatusLayout {
    fn default() -> Self {
        Self {
            animation_offset: STATUS_ANIMATION_OFFSET,
            memory_write_offset: STATUS_MEMORY_WRITE_OFFSET,
            mode_offset: STATUS_MODE_OFFSET,
            control_flag: CONTROL_FLAG,
        }
    }
}

impl StatusLayout {
    /// Minimum input report length this layout can decode.
    pub fn min_report_len(&self) -> usize {
        self.animation_offset
            .max(self.memory_write_offset)
            .max(self.mode_offset)
            + 1
    }

    /// Decode the status flags from a raw input report.
    pub fn decode(&self, report: &[u8]) -> Result<DeviceStatus, StatusError> {
        let needed = self.min_report_len();
        if report.len() < needed {
            return Err(StatusError::ShortReport {
                needed,
                actual: report.len(),
            });
        }
        Ok(DeviceStatus {
            animation_active: report[self.animation_offset] != 0,
            memory_write_active: report[self.memory_write_offset] != 0,
            control_mode: report[self.mode_offset] == self.control_flag,
        })
    }
}

/// Snapshot of the device state taken from one input report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStatus {
    pub animation_active: bool,
    pub memory_write_active: bool,
    pub control_mode: bool,
}

impl DeviceStatus {
    /// Neither an animation nor a flash write is running.
    pub fn is_idle(&self) -> bool {
        !self.animation_active && !self.memory_write_active
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "animation={} mem_write={} control={}",
            self.animation_active, self.memory_write_active, self.control_mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_idle_control() {
        let status = StatusLayout::default().decode(&[0, 0, 0, 0, 0]).unwrap();
        assert!(status.is_idle());
        assert!(status.control_mode);
    }

    #[test]
    fn test_decode_busy_flags() {
        let status = StatusLayout::default().decode(&[0, 1, 7, 1]).unwrap();
        assert!(status.animation_active);
        assert!(status.memory_write_active);
        assert!(!status.control_mode);
    }

    #[test]
    fn test_short_report() {
        let err = StatusLayout::default().decode(&[0, 0]).unwrap_err();
        assert_eq!(err, StatusError::ShortReport { needed: 4, actual: 2 });
    }

    #[test]
    fn test_custom_layout() {
        let layout = StatusLayout {
            animation_offset: 4,
            memory_write_offset: 5,
            mode_offset: 6,
            control_flag: 0xA5,
        };
        assert_eq!(layout.min_report_len(), 7);
        let status = layout.decode(&[1, 1, 1, 1, 0, 0, 0xA5]).unwrap();
        assert!(status.is_idle());
        assert!(status.control_mode);
    }
}
