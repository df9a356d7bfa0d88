//! Packet codec.
//!
//! Turns the textual lightshow payload (hex byte literals separated by
//! commas, spaces or line breaks) into fixed-size packets. A trailing run
//! shorter than the packet size is dropped rather than padded; the firmware
//! framing relies on whole packets only.

use std::fmt;
use std::ops::Deref;

use thiserror::Error;

use crate::protocol::constants::{BREAK_FILL, MAX_PACKET_SIZE};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Invalid packet size {size}: must be between 1 and {}", MAX_PACKET_SIZE)]
    InvalidPacketSize { size: i64 },

    #[error("Malformed payload: token #{index} '{token}' is not a hex byte")]
    MalformedPayload { index: usize, token: String },
}

/// One fixed-size packet of payload bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet(Box<[u8]>);

impl Packet {
    /// Break packet for the given packet size: every byte `0xFF`.
    pub fn break_packet(size: usize) -> Result<Self, PacketError> {
        let size = validate_packet_size(size as i64)?;
        Ok(Self(vec![BREAK_FILL; size].into_boxed_slice()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Packet {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Packet {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet(")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        write!(f, ")")
    }
}

fn validate_packet_size(size: i64) -> Result<usize, PacketError> {
    if size <= 0 || size > MAX_PACKET_SIZE as i64 {
        return Err(PacketError::InvalidPacketSize { size });
    }
    Ok(size as usize)
}

/// Split a payload blob into byte tokens and parse each as hex.
pub fn parse_tokens(blob: &str) -> Result<Vec<u8>, PacketError> {
    blob.split([',', ' ', '\r', '\n', '\t'])
        .filter(|t| !t.is_empty())
        .enumerate()
        .map(|(index, token)| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            u8::from_str_radix(digits, 16).map_err(|_| PacketError::MalformedPayload {
                index,
                token: token.to_string(),
            })
        })
        .collect()
}

/// Group `tokens` into packets of exactly `packet_size` bytes.
pub fn chunk(tokens: &[u8], packet_size: i64) -> Result<Vec<Packet>, PacketError> {
    let size = validate_packet_size(packet_size)?;
    Ok(tokens
        .chunks_exact(size)
        .map(|c| Packet::from(c.to_vec()))
        .collect())
}

/// Parse a payload blob and chunk it into packets.
///
/// The packet size is checked before any token is parsed.
pub fn encode_payload(blob: &str, packet_size: i64) -> Result<Vec<Packet>, PacketError> {
    validate_packet_size(packet_size)?;
    let tokens = parse_tokens(blob)?;
    chunk(&tokens, packet_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(packets: &[Packet]) -> Vec<Vec<u8>> {
        packets.iter().map(|p| p.to_vec()).collect()
    }

    #[test]
    fn test_pairs() {
        let packets = encode_payload("FF,00,AA,BB", 2).unwrap();
        assert_eq!(bytes(&packets), vec![vec![0xFF, 0x00], vec![0xAA, 0xBB]]);
    }

    #[test]
    fn test_trailing_remainder_dropped() {
        let packets = encode_payload("FF,00,AA,BB", 3).unwrap();
        assert_eq!(bytes(&packets), vec![vec![0xFF, 0x00, 0xAA]]);
    }

    #[test]
    fn test_packet_count_and_length() {
        let tokens: Vec<u8> = (0..=100).collect();
        for size in 1..=12 {
            let packets = chunk(&tokens, size).unwrap();
            assert_eq!(packets.len(), tokens.len() / size as usize);
            assert!(packets.iter().all(|p| p.len() == size as usize));
        }
    }

    #[test]
    fn test_exact_multiple_keeps_everything() {
        let tokens: Vec<u8> = (0..12).collect();
        let packets = chunk(&tokens, 4).unwrap();
        let flat: Vec<u8> = packets.iter().flat_map(|p| p.to_vec()).collect();
        assert_eq!(flat, tokens);
    }

    #[test]
    fn test_one_short_drops_last_run() {
        let tokens: Vec<u8> = (0..11).collect();
        let packets = chunk(&tokens, 4).unwrap();
        let flat: Vec<u8> = packets.iter().flat_map(|p| p.to_vec()).collect();
        assert_eq!(flat, (0..8).collect::<Vec<u8>>());
    }

    #[test]
    fn test_mixed_separators() {
        let tokens = parse_tokens("01, 02\r\n03 0x04,,\n0A").unwrap();
        assert_eq!(tokens, vec![0x01, 0x02, 0x03, 0x04, 0x0A]);
    }

    #[test]
    fn test_malformed_token() {
        let err = parse_tokens("01,ZZ,03").unwrap_err();
        assert_eq!(
            err,
            PacketError::MalformedPayload {
                index: 1,
                token: "ZZ".into()
            }
        );
        assert!(parse_tokens("100").is_err());
    }

    #[test]
    fn test_invalid_packet_size() {
        assert_eq!(
            chunk(&[1, 2], 0).unwrap_err(),
            PacketError::InvalidPacketSize { size: 0 }
        );
        assert!(chunk(&[1, 2], -3).is_err());
        assert!(chunk(&[1, 2], 256).is_err());
        // Size is rejected before the payload is looked at.
        assert!(matches!(
            encode_payload("not hex", 0),
            Err(PacketError::InvalidPacketSize { .. })
        ));
    }

    #[test]
    fn test_break_packet() {
        let packet = Packet::break_packet(4).unwrap();
        assert_eq!(packet.as_bytes(), &[0xFF; 4]);
        assert!(Packet::break_packet(0).is_err());
    }
}
