//! HID report descriptor parsing.
//!
//! Only the items needed to size reports are interpreted: Report Size,
//! Report Count, Report ID, Push/Pop and the Input/Output main items.
//! Lengths follow the host convention of counting the report-ID byte, so a
//! device with a single unnumbered 64-byte report reports a length of 65.

use std::collections::BTreeMap;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use super::constants::REPORT_ID_LEN;

const ITEM_TYPE_MAIN: u8 = 0;
const ITEM_TYPE_GLOBAL: u8 = 1;

const MAIN_INPUT: u8 = 0x8;
const MAIN_OUTPUT: u8 = 0x9;

const GLOBAL_REPORT_SIZE: u8 = 0x7;
const GLOBAL_REPORT_ID: u8 = 0x8;
const GLOBAL_REPORT_COUNT: u8 = 0x9;
const GLOBAL_PUSH: u8 = 0xA;
const GLOBAL_POP: u8 = 0xB;

const LONG_ITEM_PREFIX: u8 = 0xFE;

/// Reports are transferred with a 16-bit wLength.
const MAX_REPORT_BITS: u64 = u16::MAX as u64 * 8;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Truncated item at offset {offset}")]
    Truncated { offset: usize },
    #[error("Pop without matching Push at offset {offset}")]
    UnbalancedPop { offset: usize },
    #[error("Report size overflows at offset {offset}")]
    Overflow { offset: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Report byte lengths derived from a report descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportLengths {
    /// Longest input report including the report-ID byte, or 0 if none.
    pub input: usize,
    /// Longest output report including the report-ID byte, or 0 if none.
    pub output: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct GlobalState {
    report_size: u32,
    report_count: u32,
    report_id: u8,
}

/// Walk `descriptor` and compute the input/output report lengths.
pub fn parse_report_lengths(descriptor: &[u8]) -> Result<ReportLengths, DescriptorError> {
    let mut globals = GlobalState::default();
    let mut stack: Vec<GlobalState> = Vec::new();
    let mut input_bits: BTreeMap<u8, u64> = BTreeMap::new();
    let mut output_bits: BTreeMap<u8, u64> = BTreeMap::new();

    let mut offset = 0;
    while offset < descriptor.len() {
        let prefix = descriptor[offset];

        if prefix == LONG_ITEM_PREFIX {
            let size = *descriptor
                .get(offset + 1)
                .ok_or(DescriptorError::Truncated { offset })? as usize;
            offset += 3 + size;
            if offset > descriptor.len() {
                return Err(DescriptorError::Truncated { offset });
            }
            continue;
        }

        let size = match prefix & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let item_type = (prefix >> 2) & 0x03;
        let tag = prefix >> 4;

        let data = descriptor
            .get(offset + 1..offset + 1 + size)
            .ok_or(DescriptorError::Truncated { offset })?;
        let value = read_item_data(data)?;

        match (item_type, tag) {
            (ITEM_TYPE_GLOBAL, GLOBAL_REPORT_SIZE) => globals.report_size = value,
            (ITEM_TYPE_GLOBAL, GLOBAL_REPORT_COUNT) => globals.report_count = value,
            (ITEM_TYPE_GLOBAL, GLOBAL_REPORT_ID) => globals.report_id = value as u8,
            (ITEM_TYPE_GLOBAL, GLOBAL_PUSH) => stack.push(globals),
            (ITEM_TYPE_GLOBAL, GLOBAL_POP) => {
                globals = stack
                    .pop()
                    .ok_or(DescriptorError::UnbalancedPop { offset })?;
            }
            (ITEM_TYPE_MAIN, MAIN_INPUT) => {
                add_field(&mut input_bits, &globals, offset)?;
            }
            (ITEM_TYPE_MAIN, MAIN_OUTPUT) => {
                add_field(&mut output_bits, &globals, offset)?;
            }
            _ => {}
        }

        offset += 1 + size;
    }

    Ok(ReportLengths {
        input: longest_report(&input_bits),
        output: longest_report(&output_bits),
    })
}

fn read_item_data(data: &[u8]) -> Result<u32, DescriptorError> {
    let mut cursor = Cursor::new(data);
    Ok(match data.len() {
        0 => 0,
        1 => cursor.read_u8()? as u32,
        2 => cursor.read_u16::<LittleEndian>()? as u32,
        _ => cursor.read_u32::<LittleEndian>()?,
    })
}

/// Add one main item's bits to the running total of its report.
fn add_field(
    bits_per_id: &mut BTreeMap<u8, u64>,
    globals: &GlobalState,
    offset: usize,
) -> Result<(), DescriptorError> {
    let total = bits_per_id.entry(globals.report_id).or_default();
    let current = *total;
    *total = (globals.report_size as u64)
        .checked_mul(globals.report_count as u64)
        .and_then(|bits| current.checked_add(bits))
        .filter(|&bits| bits <= MAX_REPORT_BITS)
        .ok_or(DescriptorError::Overflow { offset })?;
    Ok(())
}

fn longest_report(bits_per_id: &BTreeMap<u8, u64>) -> usize {
    bits_per_id
        .values()
        .map(|bits| bits.div_ceil(8) as usize + REPORT_ID_LEN)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Vendor-defined page, one 64-byte input and one 64-byte output report.
    const VENDOR_64: &[u8] = &[
        0x06, 0x00, 0xFF, // Usage Page (Vendor 0xFF00)
        0x09, 0x01, // Usage (1)
        0xA1, 0x01, // Collection (Application)
        0x15, 0x00, //   Logical Minimum (0)
        0x26, 0xFF, 0x00, //   Logical Maximum (255)
        0x75, 0x08, //   Report Size (8)
        0x95, 0x40, //   Report Count (64)
        0x09, 0x01, //   Usage (1)
        0x81, 0x02, //   Input (Data, Var, Abs)
        0x95, 0x40, //   Report Count (64)
        0x09, 0x01, //   Usage (1)
        0x91, 0x02, //   Output (Data, Var, Abs)
        0xC0, // End Collection
    ];

    #[test]
    fn test_vendor_64_byte_reports() {
        let lengths = parse_report_lengths(VENDOR_64).unwrap();
        assert_eq!(lengths, ReportLengths { input: 65, output: 65 });
    }

    #[test]
    fn test_report_ids_take_longest() {
        let desc = [
            0x85, 0x01, // Report ID (1)
            0x75, 0x08, // Report Size (8)
            0x95, 0x04, // Report Count (4)
            0x81, 0x02, // Input
            0x85, 0x02, // Report ID (2)
            0x95, 0x10, // Report Count (16)
            0x81, 0x02, // Input
            0x91, 0x02, // Output
        ];
        let lengths = parse_report_lengths(&desc).unwrap();
        assert_eq!(lengths.input, 17);
        assert_eq!(lengths.output, 17);
    }

    #[test]
    fn test_bit_fields_round_up() {
        let desc = [
            0x75, 0x01, // Report Size (1)
            0x95, 0x03, // Report Count (3)
            0x81, 0x02, // Input
            0x75, 0x05, // Report Size (5)
            0x95, 0x01, // Report Count (1)
            0x81, 0x03, // Input (padding)
            0x75, 0x01, // Report Size (1)
            0x95, 0x01, // Report Count (1)
            0x81, 0x02, // Input
        ];
        let lengths = parse_report_lengths(&desc).unwrap();
        assert_eq!(lengths.input, 3);
        assert_eq!(lengths.output, 0);
    }

    #[test]
    fn test_push_pop_restores_globals() {
        let desc = [
            0x75, 0x08, // Report Size (8)
            0x95, 0x02, // Report Count (2)
            0xA4, // Push
            0x95, 0x10, // Report Count (16)
            0xB4, // Pop
            0x91, 0x02, // Output
        ];
        let lengths = parse_report_lengths(&desc).unwrap();
        assert_eq!(lengths.output, 3);
    }

    #[test]
    fn test_truncated_item() {
        let desc = [0x75, 0x08, 0x26, 0xFF];
        assert!(matches!(
            parse_report_lengths(&desc),
            Err(DescriptorError::Truncated { offset: 2 })
        ));
    }

    #[test]
    fn test_oversized_fields_rejected() {
        let desc = [
            0x77, 0xFF, 0xFF, 0xFF, 0xFF, // Report Size (0xFFFFFFFF)
            0x97, 0xFF, 0xFF, 0xFF, 0xFF, // Report Count (0xFFFFFFFF)
            0x81, 0x02, // Input
            0x81, 0x02, // Input
        ];
        assert!(matches!(
            parse_report_lengths(&desc),
            Err(DescriptorError::Overflow { offset: 10 })
        ));

        // 65536 bytes no longer fit a control transfer.
        let desc = [
            0x75, 0x08, // Report Size (8)
            0x97, 0x00, 0x00, 0x01, 0x00, // Report Count (65536)
            0x91, 0x02, // Output
        ];
        assert!(matches!(
            parse_report_lengths(&desc),
            Err(DescriptorError::Overflow { offset: 7 })
        ));
    }

    #[test]
    fn test_unbalanced_pop() {
        assert!(matches!(
            parse_report_lengths(&[0xB4]),
            Err(DescriptorError::UnbalancedPop { offset: 0 })
        ));
    }
}
