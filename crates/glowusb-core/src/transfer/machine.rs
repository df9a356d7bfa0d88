//! Per-packet transfer state machine.

use std::fmt;

use crate::protocol::DeviceStatus;

/// Phase of a single packet exchange.
///
/// Every packet starts at `Idle`; `Ready` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferPhase {
    #[default]
    Idle,
    /// Output report written and the first status read back.
    Sent,
    /// Device reported busy; polling.
    Busy,
    Ready,
    Failed,
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPhase::Idle => write!(f, "IDLE"),
            TransferPhase::Sent => write!(f, "SENT"),
            TransferPhase::Busy => write!(f, "BUSY"),
            TransferPhase::Ready => write!(f, "READY"),
            TransferPhase::Failed => write!(f, "FAILED"),
        }
    }
}

impl TransferPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferPhase::Ready | TransferPhase::Failed)
    }
}

/// Which kind of packet is being sent; decides what "ready" means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Break,
    Data,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Break => write!(f, "break"),
            PacketKind::Data => write!(f, "data"),
        }
    }
}

/// Verdict on one status read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Still busy; the reason is for logging.
    Busy(&'static str),
    /// Device is idle but in a state the packet cannot complete in.
    Rejected,
}

impl PacketKind {
    pub fn readiness(&self, status: &DeviceStatus) -> Readiness {
        match self {
            PacketKind::Break => {
                if !status.is_idle() {
                    if status.animation_active {
                        Readiness::Busy("animation in progress")
                    } else {
                        Readiness::Busy("write in progress")
                    }
                } else if status.control_mode {
                    Readiness::Ready
                } else {
                    Readiness::Rejected
                }
            }
            PacketKind::Data => {
                if status.memory_write_active {
                    Readiness::Busy("write in progress")
                } else {
                    Readiness::Ready
                }
            }
        }
    }
}

/// Phase tracker for one packet.
#[derive(Debug, Default)]
pub struct PacketTransfer {
    phase: TransferPhase,
}

impl PacketTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    /// Transition to a new phase.
    pub fn goto_phase(&mut self, new_phase: TransferPhase) {
        if self.phase != new_phase {
            tracing::trace!(from = %self.phase, to = %new_phase, "Packet phase transition");
        }
        self.phase = new_phase;
    }
}
