//! Mock HID transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{
    AccessMode, DeviceCandidate, HidHandle, HidHost, ReportCapabilities, TransportError,
};

#[derive(Debug)]
struct DeviceState {
    capabilities: ReportCapabilities,
    /// Queued input reports to return on read.
    report_queue: VecDeque<Vec<u8>>,
    /// Captured output reports.
    write_log: Vec<Vec<u8>>,
    reads: usize,
    opens: Vec<AccessMode>,
    fail_open: Option<AccessMode>,
    fail_capabilities: bool,
    connected: bool,
}

/// Simulated HID interface. Clones share state.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    candidate: DeviceCandidate,
    state: Arc<Mutex<DeviceState>>,
}

impl SimulatedDevice {
    /// Device with 65-byte input and output reports.
    pub fn new(vendor_id: u16, product_id: u16, path: &str) -> Self {
        Self {
            candidate: DeviceCandidate {
                vendor_id,
                product_id,
                path: path.to_string(),
            },
            state: Arc::new(Mutex::new(DeviceState {
                capabilities: ReportCapabilities {
                    input_report_len: 65,
                    output_report_len: 65,
                },
                report_queue: VecDeque::new(),
                write_log: Vec::new(),
                reads: 0,
                opens: Vec::new(),
                fail_open: None,
                fail_capabilities: false,
                connected: true,
            })),
        }
    }

    pub fn with_capabilities(self, input_report_len: usize, output_report_len: usize) -> Self {
        self.state.lock().unwrap().capabilities = ReportCapabilities {
            input_report_len,
            output_report_len,
        };
        self
    }

    /// Make opening a handle with `mode` fail.
    pub fn with_open_failure(self, mode: AccessMode) -> Self {
        self.state.lock().unwrap().fail_open = Some(mode);
        self
    }

    /// Make the capability query fail.
    pub fn with_capabilities_failure(self) -> Self {
        self.state.lock().unwrap().fail_capabilities = true;
        self
    }

    pub fn candidate(&self) -> &DeviceCandidate {
        &self.candidate
    }

    /// Queue a raw input report to be returned on next read.
    pub fn queue_report(&self, report: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .report_queue
            .push_back(report.to_vec());
    }

    /// Queue a status report using the default firmware layout.
    pub fn queue_status(&self, animation: bool, memory_write: bool, mode: u8) {
        let len = self.state.lock().unwrap().capabilities.input_report_len;
        let mut report = vec![0u8; len.max(4)];
        report[1] = animation as u8;
        report[2] = memory_write as u8;
        report[3] = mode;
        self.queue_report(&report);
    }

    /// Queue `count` copies of the same status report.
    pub fn queue_status_n(&self, count: usize, animation: bool, memory_write: bool, mode: u8) {
        for _ in 0..count {
            self.queue_status(animation, memory_write, mode);
        }
    }

    /// Get all captured writes.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().write_log.clone()
    }

    /// Number of input reports read so far.
    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    /// Access modes of every successful open, in order.
    pub fn opens(&self) -> Vec<AccessMode> {
        self.state.lock().unwrap().opens.clone()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.state.lock().unwrap().connected = false;
    }
}

/// Mock host exposing a fixed set of simulated devices.
#[derive(Debug, Default, Clone)]
pub struct MockHidHost {
    devices: Vec<SimulatedDevice>,
}

impl MockHidHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: SimulatedDevice) -> Self {
        self.devices.push(device);
        self
    }
}

impl HidHost for MockHidHost {
    type Handle = MockHandle;

    fn candidates(
        &self,
    ) -> Result<Box<dyn Iterator<Item = DeviceCandidate> + '_>, TransportError> {
        Ok(Box::new(self.devices.iter().map(|d| d.candidate.clone())))
    }

    fn open(&self, path: &str, mode: AccessMode) -> Result<MockHandle, TransportError> {
        let device = self
            .devices
            .iter()
            .find(|d| d.candidate.path == path)
            .ok_or_else(|| TransportError::NoSuchPath(path.to_string()))?;

        let mut state = device.state.lock().unwrap();
        if state.fail_open == Some(mode) || !state.connected {
            return Err(TransportError::OpenFailed {
                path: path.to_string(),
                message: "access denied".into(),
            });
        }
        state.opens.push(mode);

        Ok(MockHandle {
            state: Arc::clone(&device.state),
            mode,
        })
    }
}

/// Handle on a simulated device.
pub struct MockHandle {
    state: Arc<Mutex<DeviceState>>,
    mode: AccessMode,
}

impl HidHandle for MockHandle {
    fn capabilities(&self) -> Result<ReportCapabilities, TransportError> {
        let state = self.state.lock().unwrap();
        if state.fail_capabilities {
            return Err(TransportError::CapabilitiesFailed(
                "preparsed data unavailable".into(),
            ));
        }
        Ok(state.capabilities)
    }

    fn write_report(&self, report: &[u8]) -> Result<(), TransportError> {
        if self.mode != AccessMode::Write {
            return Err(TransportError::WrongAccessMode {
                mode: self.mode,
                operation: "write",
            });
        }
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        state.write_log.push(report.to_vec());
        Ok(())
    }

    fn read_report(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        if self.mode != AccessMode::Read {
            return Err(TransportError::WrongAccessMode {
                mode: self.mode,
                operation: "read",
            });
        }
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        let mut report = state
            .report_queue
            .pop_front()
            .ok_or_else(|| TransportError::ReadFailed("no input report queued".into()))?;
        state.reads += 1;
        report.truncate(len);
        Ok(report)
    }
}
