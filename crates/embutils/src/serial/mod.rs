//! Serial communication.
//!
//! - [`device`]: blocking serial devices and the in-memory loopback
//! - [`scan`]: port discovery and hot-plug events
//! - [`stream`]: background item streams with reconnection
//! - [`interface`]: async request/response on top of a stream

pub mod device;
pub mod interface;
pub mod scan;
pub mod stream;

pub use device::{Device, DeviceInfo, SerialSettings, LOOPBACK_ID, LOOPBACK_PORT};
pub use interface::Interface;
pub use scan::{DeviceList, DeviceScanner, ScanEvent, ScanEventKind, DEFAULT_SCAN_PERIOD};
pub use stream::{Stream, StreamEvent};
