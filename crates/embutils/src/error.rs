//! Error types for embutils.
//!
//! This module defines all error types used throughout the embutils crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

use crate::cobs::CobsError;

/// The main error type for embutils operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Serial Errors ===
    /// The serial port driver reported an error.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The requested port is not connected to the system.
    #[error("serial port not found: {port}")]
    PortNotFound {
        /// Name of the missing port.
        port: String,
    },

    /// An operation needed an open device.
    #[error("device on {port} is not open")]
    NotOpen {
        /// Name of the port.
        port: String,
    },

    /// The device was lost while in use.
    #[error("device on {port} disconnected: {message}")]
    Disconnected {
        /// Name of the port.
        port: String,
        /// Description of the failure.
        message: String,
    },

    /// The stream or service is paused or stopped.
    #[error("service '{name}' is not running")]
    NotRunning {
        /// Name of the service.
        name: String,
    },

    // === Codec Errors ===
    /// COBS decoding failed.
    #[error("COBS decode failed: {0}")]
    Cobs(#[from] CobsError),

    /// A frame payload does not fit its length field.
    #[error("payload of {len} bytes exceeds the limit of {max}")]
    PayloadTooLarge {
        /// Payload length.
        len: usize,
        /// Maximum length accepted.
        max: usize,
    },

    // === File Format Errors ===
    /// An Intel HEX line could not be parsed.
    #[error("invalid Intel HEX at line {line}: {message}")]
    HexParse {
        /// One-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// Two images both hold data at the same address.
    #[error("data overlap at address 0x{address:08X}")]
    HexOverlap {
        /// First overlapping address.
        address: u32,
    },

    /// A requested address range is not fully populated.
    #[error("no data at address 0x{address:08X}")]
    HexMissingData {
        /// First missing address.
        address: u32,
    },

    /// Flattening an image would exceed the size limit.
    #[error("image spans {span} bytes, more than the limit of {max}")]
    HexSpanTooLarge {
        /// Bytes between the lowest and highest address.
        span: u64,
        /// Largest binary allowed.
        max: u64,
    },

    /// A path failed validation.
    #[error("invalid path {path}: {message}")]
    PathValidation {
        /// The offending path.
        path: PathBuf,
        /// Why the path was rejected.
        message: String,
    },

    // === Version Errors ===
    /// A version string or bump request was not understood.
    #[error("invalid version '{input}': {message}")]
    VersionParse {
        /// The rejected input.
        input: String,
        /// Description of the problem.
        message: String,
    },

    /// A textual value was not understood.
    #[error("invalid value '{input}': {message}")]
    InvalidValue {
        /// The rejected input.
        input: String,
        /// Description of the problem.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Process Errors ===
    /// An external command could not be started.
    #[error("failed to run '{command}': {source}")]
    CommandSpawn {
        /// The command line.
        command: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An external command exited unsuccessfully.
    #[error("command '{command}' failed with exit code {code:?}")]
    CommandFailed {
        /// The command line.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for embutils operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a path validation error.
    #[must_use]
    pub fn path(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PathValidation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a version parse error.
    #[must_use]
    pub fn version(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VersionParse {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create an invalid value error.
    #[must_use]
    pub fn invalid_value(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create an Intel HEX parse error.
    #[must_use]
    pub fn hex_parse(line: usize, message: impl Into<String>) -> Self {
        Self::HexParse {
            line,
            message: message.into(),
        }
    }

    /// Create a disconnection error.
    #[must_use]
    pub fn disconnected(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Disconnected {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Check if this error means the device connection is gone.
    ///
    /// Only these errors trigger a reconnection in streams; everything else
    /// is a data problem.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. } | Self::NotOpen { .. } | Self::Serial(_)
        )
    }

    /// Check if this error is a path validation failure.
    #[must_use]
    pub fn is_path_error(&self) -> bool {
        matches!(self, Self::PathValidation { .. })
    }
}
