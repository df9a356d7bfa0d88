//! Transfer session - high-level orchestrator for one lightshow command.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::config::Command;
use crate::device::{HidChannel, MatchError, open_device};
use crate::events::{GlowEvent, GlowObserver, SessionPhase, TracingObserver};
use crate::packet::{Packet, PacketError, encode_payload};
use crate::transfer::{PacketKind, TransferError, TransferPolicy, send_break, send_data};
use crate::transport::{HidHandle, HidHost};

/// Fully resolved parameters of one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Packet byte size; validated when the payload is encoded.
    pub packet_size: i64,
    /// Hex payload blob for the selected command.
    pub payload: String,
    pub command: Command,
    pub policy: TransferPolicy,
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    DeviceNotFound = 1,
    TransferFailed = 2,
    InvalidConfig = 4,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Match(#[from] MatchError),
}

impl SessionError {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            SessionError::Packet(_) => ExitStatus::InvalidConfig,
            SessionError::Match(_) => ExitStatus::DeviceNotFound,
        }
    }
}

/// Where a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Break,
    /// 1-based index of the data packet that failed.
    Data { index: usize },
    TrailingBreak,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Break => write!(f, "break packet"),
            FailureStage::Data { index } => write!(f, "data packet {}", index),
            FailureStage::TrailingBreak => write!(f, "trailing break packet"),
        }
    }
}

#[derive(Debug)]
pub struct SessionFailure {
    pub stage: FailureStage,
    pub error: TransferError,
}

/// Aggregate outcome of a session.
#[derive(Debug)]
pub struct SessionReport {
    /// Data packets for which a send was started.
    pub attempted: usize,
    /// Data packets confirmed by the device.
    pub succeeded: usize,
    pub total: usize,
    /// Busy polls summed over every packet, breaks included.
    pub retries: u32,
    pub failure: Option<SessionFailure>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.is_success() {
            ExitStatus::Success
        } else {
            ExitStatus::TransferFailed
        }
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(
                f,
                "USB transfer succeeded: {} out of {} data-packets sent",
                self.succeeded, self.total
            ),
            Some(failure) => write!(
                f,
                "USB transfer failed at {} ({}): {} out of {} data-packets sent",
                failure.stage, failure.error, self.succeeded, self.total
            ),
        }
    }
}

/// Send the break packet, every data packet in order, then optionally a
/// trailing break. Stops at the first failure.
pub fn run_session<H: HidHandle, O: GlowObserver + ?Sized>(
    channel: &HidChannel<H>,
    break_packet: &Packet,
    data_packets: &[Packet],
    trailing_break: bool,
    policy: &TransferPolicy,
    observer: &O,
) -> SessionReport {
    let total = data_packets.len();
    let mut report = SessionReport {
        attempted: 0,
        succeeded: 0,
        total,
        retries: 0,
        failure: None,
    };
    let mut phase = SessionPhase::Matching;
    let mut goto = |to: SessionPhase| {
        observer.on_event(&GlowEvent::PhaseChanged { from: phase, to });
        phase = to;
    };

    let fail = |report: &mut SessionReport, stage: FailureStage, error: TransferError| {
        let (kind, index) = match stage {
            FailureStage::Data { index } => (PacketKind::Data, index),
            _ => (PacketKind::Break, 0),
        };
        observer.on_event(&GlowEvent::PacketFailed {
            kind,
            index,
            message: error.to_string(),
        });
        report.failure = Some(SessionFailure { stage, error });
    };

    goto(SessionPhase::Break);
    match send_break(channel, break_packet, policy) {
        Ok(sent) => {
            report.retries += sent.retries;
            observer.on_event(&GlowEvent::PacketSent {
                kind: PacketKind::Break,
                index: 0,
                total,
                retries: sent.retries,
            });
        }
        Err(e) => {
            fail(&mut report, FailureStage::Break, e);
        }
    }

    if report.is_success() {
        goto(SessionPhase::Data);
        for (i, packet) in data_packets.iter().enumerate() {
            let index = i + 1;
            report.attempted += 1;
            match send_data(channel, packet, policy) {
                Ok(sent) => {
                    report.succeeded += 1;
                    report.retries += sent.retries;
                    observer.on_event(&GlowEvent::PacketSent {
                        kind: PacketKind::Data,
                        index,
                        total,
                        retries: sent.retries,
                    });
                }
                Err(e) => {
                    fail(&mut report, FailureStage::Data { index }, e);
                    break;
                }
            }
        }
    }

    if report.is_success() && trailing_break {
        goto(SessionPhase::TrailingBreak);
        match send_break(channel, break_packet, policy) {
            Ok(sent) => {
                report.retries += sent.retries;
                observer.on_event(&GlowEvent::PacketSent {
                    kind: PacketKind::Break,
                    index: 0,
                    total,
                    retries: sent.retries,
                });
            }
            Err(e) => fail(&mut report, FailureStage::TrailingBreak, e),
        }
    }

    goto(if report.is_success() {
        SessionPhase::Complete
    } else {
        SessionPhase::Failed
    });
    observer.on_event(&GlowEvent::Finished {
        succeeded: report.succeeded,
        total,
    });
    report
}

/// Session - encodes the payload, opens the device and runs the transfer.
pub struct Session<O: GlowObserver> {
    config: SessionConfig,
    observer: Arc<O>,
}

impl Session<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: GlowObserver> Session<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self { config, observer }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the complete session against `host`.
    ///
    /// Payload and packet size are validated before the device is touched.
    /// Transfer failures are reported in the returned [`SessionReport`].
    #[instrument(skip(self, host), fields(command = %self.config.command))]
    pub fn run<T: HidHost>(&self, host: &T) -> Result<SessionReport, SessionError> {
        let config = &self.config;
        let data_packets = encode_payload(&config.payload, config.packet_size)?;
        let break_packet = Packet::break_packet(config.packet_size as usize)?;
        info!(
            packets = data_packets.len(),
            packet_size = config.packet_size,
            "Payload encoded"
        );

        let channel = open_device(host, config.vendor_id, config.product_id)?;
        self.observer.on_event(&GlowEvent::DeviceConnected {
            vid: channel.vendor_id(),
            pid: channel.product_id(),
            path: channel.path().to_string(),
        });

        let report = run_session(
            &channel,
            &break_packet,
            &data_packets,
            config.command.sends_trailing_break(),
            &config.policy,
            self.observer.as_ref(),
        );
        channel.close();

        info!("{}", report);
        Ok(report)
    }
}
