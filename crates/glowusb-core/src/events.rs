//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to follow a transfer session
//! without tight coupling to the core logic.

use std::fmt;

use crate::transfer::PacketKind;

/// Session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Looking for the device.
    Matching,
    /// Sending the leading break packet.
    Break,
    /// Sending data packets.
    Data,
    /// Sending the break packet that ends a download.
    TrailingBreak,
    /// All packets sent.
    Complete,
    /// Session aborted.
    Failed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Matching => write!(f, "Matching Device"),
            SessionPhase::Break => write!(f, "Break"),
            SessionPhase::Data => write!(f, "Data Transfer"),
            SessionPhase::TrailingBreak => write!(f, "Trailing Break"),
            SessionPhase::Complete => write!(f, "Complete"),
            SessionPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Events emitted by a transfer session.
#[derive(Debug, Clone)]
pub enum GlowEvent {
    /// Device matched and opened.
    DeviceConnected { vid: u16, pid: u16, path: String },
    /// Phase changed.
    PhaseChanged { from: SessionPhase, to: SessionPhase },
    /// A packet reached the ready state.
    PacketSent {
        kind: PacketKind,
        /// 1-based data packet index; 0 for break packets.
        index: usize,
        total: usize,
        retries: u32,
    },
    /// A packet failed; the session stops here.
    PacketFailed {
        kind: PacketKind,
        index: usize,
        message: String,
    },
    /// Session finished (successfully or not).
    Finished { succeeded: usize, total: usize },
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait GlowObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &GlowEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl GlowObserver for NullObserver {
    fn on_event(&self, _event: &GlowEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl GlowObserver for TracingObserver {
    fn on_event(&self, event: &GlowEvent) {
        match event {
            GlowEvent::DeviceConnected { vid, pid, path } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), path = %path, "USB device found");
            }
            GlowEvent::PhaseChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Phase changed");
            }
            GlowEvent::PacketSent {
                kind,
                index,
                total,
                retries,
            } => match kind {
                PacketKind::Break => tracing::debug!(retries, "Break packet sent"),
                PacketKind::Data => {
                    tracing::debug!(packet = index, total, retries, "Data packet sent")
                }
            },
            GlowEvent::PacketFailed {
                kind,
                index,
                message,
            } => {
                tracing::error!(kind = %kind, packet = index, "USB transfer failed: {}", message);
            }
            GlowEvent::Finished { succeeded, total } => {
                tracing::debug!(succeeded, total, "Session finished");
            }
        }
    }
}
