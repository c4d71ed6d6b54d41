//! `embutils` - Utilities for embedded development
//!
//! This library provides serial device streams with reconnection, COBS framed
//! packets, CRC models, Intel HEX image handling and firmware repository
//! maintenance (version files, IDE builds, developer tasks).

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod bits;
pub mod cli;
pub mod cobs;
pub mod codec;
pub mod config;
pub mod crc;
pub mod error;
pub mod frame;
pub mod hex;
pub mod logging;
pub mod mac;
pub mod math;
pub mod parsed;
pub mod path;
pub mod repo;
pub mod serial;
pub mod service;
pub mod subprocess;
pub mod usb_id;
pub mod version;

pub use codec::{CobsCodec, Serialized, StreamCodec};
pub use config::Config;
pub use crc::{Crc, CrcModel, CrcPreset};
pub use error::{Error, Result};
pub use frame::SimpleFrame;
pub use hex::IntelHex;
pub use logging::init_logging;
pub use mac::MacAddress;
pub use serial::{Device, DeviceScanner, Interface, Stream, StreamEvent};
pub use service::{Service, ServiceHandle, ServiceState, ServiceTask};
pub use usb_id::UsbId;
pub use version::Version;
