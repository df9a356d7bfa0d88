//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use mock::{MockHandle, MockHidHost, SimulatedDevice};
pub use self::nusb::{NusbHandle, NusbHost};
pub use traits::{
    AccessMode, DeviceCandidate, HidHandle, HidHost, ReportCapabilities, TransportError,
};
