//! Transfer module - packet exchange with busy polling.

pub mod exchange;
pub mod machine;

pub use exchange::{
    PacketReport, ReportKind, TransferError, TransferPolicy, build_output_report, exchange,
    poll_status, send_break, send_data,
};
pub use machine::{PacketKind, PacketTransfer, Readiness, TransferPhase};
