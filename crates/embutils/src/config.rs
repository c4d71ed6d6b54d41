//! Configuration management for embutils.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity, StopBits};

use crate::error::{Error, Result};
use crate::hex::{DEFAULT_MAX_BIN_BYTES, DEFAULT_RECORD_BYTES};
use crate::serial::SerialSettings;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration directory name.
const CONFIG_DIR_NAME: &str = "embutils";

/// Prefix of the environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "EMBUTILS_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `EMBUTILS_`, sections separated
///    by `__`, e.g. `EMBUTILS_SERIAL__BAUD_RATE`)
/// 2. TOML config file at `<config dir>/embutils/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial line settings for devices.
    pub serial: SerialConfig,
    /// Stream worker settings.
    pub stream: StreamConfig,
    /// Command interface settings.
    pub interface: InterfaceConfig,
    /// Device scanner settings.
    pub scanner: ScannerConfig,
    /// Intel HEX output settings.
    pub hex: HexConfig,
    /// Developer task settings.
    pub tasks: TasksConfig,
}

/// Serial line configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate.
    pub baud_rate: u32,
    /// Bits per character, 5 to 8.
    pub data_bits: u8,
    /// Parity: `none`, `odd` or `even`.
    pub parity: String,
    /// Stop bits, 1 or 2.
    pub stop_bits: u8,
    /// Read timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Stream worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Time between reconnection attempts in milliseconds.
    pub reconnect_period_ms: u64,
    /// Delay between worker iterations in milliseconds.
    pub task_delay_ms: u64,
    /// Events buffered per subscriber before it lags.
    pub channel_capacity: usize,
}

/// Command interface configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
    /// Time to wait for a response in milliseconds.
    pub response_timeout_ms: u64,
    /// Baud rate used by interfaces, overriding `serial.baud_rate`.
    pub baud_rate: u32,
}

/// Device scanner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Time between scans in milliseconds.
    pub period_ms: u64,
}

/// Intel HEX output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HexConfig {
    /// Data bytes per record when writing files.
    pub record_bytes: u8,
    /// Largest flat binary written from a HEX image.
    pub max_bin_bytes: u64,
}

/// Developer task configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Minimum line coverage in percent.
    pub coverage_threshold: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: 8,
            parity: "none".to_string(),
            stop_bits: 1,
            timeout_ms: 100,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_period_ms: 500,
            task_delay_ms: 1,
            channel_capacity: 64,
        }
    }
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 500,
            baud_rate: 230_400,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { period_ms: 500 }
    }
}

impl Default for HexConfig {
    fn default() -> Self {
        Self {
            record_bytes: DEFAULT_RECORD_BYTES,
            max_bin_bytes: DEFAULT_MAX_BIN_BYTES,
        }
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: 90,
        }
    }
}

impl SerialConfig {
    /// Line settings for opening devices.
    ///
    /// # Errors
    ///
    /// Returns an error if a field holds an unsupported value.
    pub fn settings(&self) -> Result<SerialSettings> {
        let data_bits = match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => {
                return Err(Error::ConfigValidation {
                    message: format!("data_bits must be between 5 and 8, got {other}"),
                })
            }
        };
        let parity = match self.parity.to_ascii_lowercase().as_str() {
            "none" | "n" => Parity::None,
            "odd" | "o" => Parity::Odd,
            "even" | "e" => Parity::Even,
            other => {
                return Err(Error::ConfigValidation {
                    message: format!("parity must be none, odd or even, got '{other}'"),
                })
            }
        };
        let stop_bits = match self.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => {
                return Err(Error::ConfigValidation {
                    message: format!("stop_bits must be 1 or 2, got {other}"),
                })
            }
        };
        Ok(SerialSettings {
            baud_rate: self.baud_rate,
            data_bits,
            parity,
            stop_bits,
            timeout: Duration::from_millis(self.timeout_ms),
        })
    }
}

impl StreamConfig {
    /// Get the reconnect period as a Duration.
    #[must_use]
    pub fn reconnect_period(&self) -> Duration {
        Duration::from_millis(self.reconnect_period_ms)
    }

    /// Get the worker delay as a Duration.
    #[must_use]
    pub fn task_delay(&self) -> Duration {
        Duration::from_millis(self.task_delay_ms)
    }
}

impl InterfaceConfig {
    /// Get the response timeout as a Duration.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            return Err(invalid("serial.baud_rate must be greater than 0"));
        }
        if self.interface.baud_rate == 0 {
            return Err(invalid("interface.baud_rate must be greater than 0"));
        }
        if self.serial.timeout_ms == 0 {
            return Err(invalid("serial.timeout_ms must be greater than 0"));
        }
        self.serial.settings()?;

        if self.stream.reconnect_period_ms == 0 {
            return Err(invalid("stream.reconnect_period_ms must be greater than 0"));
        }
        if self.stream.channel_capacity == 0 {
            return Err(invalid("stream.channel_capacity must be greater than 0"));
        }
        if self.interface.response_timeout_ms == 0 {
            return Err(invalid("interface.response_timeout_ms must be greater than 0"));
        }
        if self.scanner.period_ms == 0 {
            return Err(invalid("scanner.period_ms must be greater than 0"));
        }
        if self.hex.record_bytes == 0 {
            return Err(invalid("hex.record_bytes must be greater than 0"));
        }
        if self.hex.max_bin_bytes == 0 {
            return Err(invalid("hex.max_bin_bytes must be greater than 0"));
        }
        if self.tasks.coverage_threshold > 100 {
            return Err(Error::ConfigValidation {
                message: format!(
                    "tasks.coverage_threshold ({}) cannot be greater than 100",
                    self.tasks.coverage_threshold
                ),
            });
        }
        Ok(())
    }

    /// Line settings for plain devices.
    ///
    /// # Errors
    ///
    /// Returns an error if the serial section holds an unsupported value.
    pub fn serial_settings(&self) -> Result<SerialSettings> {
        self.serial.settings()
    }

    /// Line settings for command interfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the serial section holds an unsupported value.
    pub fn interface_settings(&self) -> Result<SerialSettings> {
        Ok(SerialSettings {
            baud_rate: self.interface.baud_rate,
            ..self.serial.settings()?
        })
    }

    /// Get the scan period as a Duration.
    #[must_use]
    pub fn scan_period(&self) -> Duration {
        Duration::from_millis(self.scanner.period_ms)
    }
}

fn invalid(message: &str) -> Error {
    Error::ConfigValidation {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.interface.baud_rate, 230_400);
        assert_eq!(config.hex.record_bytes, 32);
        assert_eq!(config.hex.max_bin_bytes, 64 * 1024 * 1024);
        assert_eq!(config.tasks.coverage_threshold, 90);
    }

    #[test]
    fn test_default_serial_config() {
        let serial = SerialConfig::default();

        assert_eq!(serial.data_bits, 8);
        assert_eq!(serial.parity, "none");
        assert_eq!(serial.stop_bits, 1);
        assert_eq!(serial.timeout_ms, 100);
    }

    #[test]
    fn test_default_stream_config() {
        let stream = StreamConfig::default();

        assert_eq!(stream.reconnect_period(), Duration::from_millis(500));
        assert_eq!(stream.task_delay(), Duration::from_millis(1));
        assert_eq!(stream.channel_capacity, 64);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_baud_rate() {
        let mut config = Config::default();
        config.serial.baud_rate = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("baud_rate"));
    }

    #[test]
    fn test_validate_data_bits() {
        let mut config = Config::default();
        config.serial.data_bits = 9;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("data_bits"));
    }

    #[test]
    fn test_validate_stop_bits() {
        let mut config = Config::default();
        config.serial.stop_bits = 3;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("stop_bits"));
    }

    #[test]
    fn test_validate_parity() {
        let mut config = Config::default();
        config.serial.parity = "mark".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("parity"));
    }

    #[test]
    fn test_validate_zero_periods() {
        let mut config = Config::default();
        config.scanner.period_ms = 0;
        assert!(config.validate().unwrap_err().to_string().contains("period_ms"));

        let mut config = Config::default();
        config.stream.channel_capacity = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("channel_capacity"));

        let mut config = Config::default();
        config.interface.response_timeout_ms = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("response_timeout_ms"));
    }

    #[test]
    fn test_validate_record_bytes() {
        let mut config = Config::default();
        config.hex.record_bytes = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("record_bytes"));
    }

    #[test]
    fn test_validate_coverage_threshold() {
        let mut config = Config::default();
        config.tasks.coverage_threshold = 101;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("coverage_threshold"));
    }

    #[test]
    fn test_serial_settings() {
        let mut serial = SerialConfig::default();
        serial.parity = "Even".to_string();
        serial.stop_bits = 2;
        serial.data_bits = 7;

        let settings = serial.settings().unwrap();
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.stop_bits, StopBits::Two);
        assert_eq!(settings.data_bits, DataBits::Seven);
        assert_eq!(settings.timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_interface_settings_use_interface_baud() {
        let config = Config::default();
        assert_eq!(config.interface_settings().unwrap().baud_rate, 230_400);
        assert_eq!(config.serial_settings().unwrap().baud_rate, 115_200);
        assert_eq!(
            config.interface.response_timeout(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("embutils"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_load_from_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[serial]\nbaud_rate = 9600\n\n[hex]\nrecord_bytes = 16\n",
            )?;

            let config = Config::load_from(Some(PathBuf::from("config.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.serial.baud_rate, 9600);
            assert_eq!(config.hex.record_bytes, 16);
            assert_eq!(config.serial.timeout_ms, 100);
            Ok(())
        });
    }

    #[test]
    fn test_load_invalid_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[tasks]\ncoverage_threshold = 120\n")?;

            let err = Config::load_from(Some(PathBuf::from("config.toml"))).unwrap_err();
            assert!(matches!(err, Error::ConfigValidation { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[serial]\nbaud_rate = 9600\nparity = \"odd\"\n",
            )?;
            jail.set_env("EMBUTILS_SERIAL__BAUD_RATE", 57_600);
            jail.set_env("EMBUTILS_SCANNER__PERIOD_MS", 250);

            let config = Config::load_from(Some(PathBuf::from("config.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.serial.baud_rate, 57_600);
            assert_eq!(config.serial.parity, "odd");
            assert_eq!(config.scan_period(), Duration::from_millis(250));
            Ok(())
        });
    }

    #[test]
    fn test_serial_config_serialize() {
        let serial = SerialConfig::default();
        let json = serde_json::to_string(&serial).unwrap();
        assert!(json.contains("baud_rate"));
    }

    #[test]
    fn test_stream_config_deserialize() {
        let json = r#"{"reconnect_period_ms": 250}"#;
        let stream: StreamConfig = serde_json::from_str(json).unwrap();
        assert_eq!(stream.reconnect_period_ms, 250);
        assert_eq!(stream.channel_capacity, 64);
    }
}
