//! GlowUSB-Core: lightshow transfer engine for GlowUSB HID devices.
//!
//! This crate finds a GlowUSB controller among the attached HID interfaces
//! and streams a lightshow (or a start/stop/resume command) to it as a
//! sequence of fixed-size output reports, polling the device's status
//! report between packets while it is busy animating or writing flash.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, status decoding, report descriptor parsing
//! - **Packet**: Hex payload parsing and fixed-size chunking
//! - **Transport**: HID host abstraction (nusb, mock)
//! - **Device**: Matching and opening the target HID channel
//! - **Transfer**: Break/data packet exchange with busy polling
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//! - **Config**: TOML lightshow configuration
//!
//! # Example
//!
//! ```no_run
//! use glowusb_core::config::{Command, LightshowConfig, Overrides};
//! use glowusb_core::session::Session;
//! use glowusb_core::transport::NusbHost;
//!
//! let file = LightshowConfig::load_from_file("show.toml").unwrap();
//! let config = file.resolve(Command::Download, &Overrides::default()).unwrap();
//!
//! let report = Session::new(config).run(&NusbHost::new()).unwrap();
//! println!("{report}");
//! ```

pub mod config;
pub mod device;
pub mod events;
pub mod packet;
pub mod protocol;
pub mod session;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use config::{Command, ConfigError, LightshowConfig, Overrides};
pub use device::{HidChannel, MatchError, list_devices, open_device};
pub use events::{GlowEvent, GlowObserver, NullObserver, SessionPhase, TracingObserver};
pub use packet::{Packet, PacketError, chunk, encode_payload, parse_tokens};
pub use protocol::{DeviceStatus, StatusLayout};
pub use session::{ExitStatus, Session, SessionConfig, SessionError, SessionReport, run_session};
pub use transfer::{TransferError, TransferPolicy, exchange, send_break, send_data};
pub use transport::{HidHandle, HidHost, MockHidHost, NusbHost, TransportError};
