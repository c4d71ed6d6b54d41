//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::repo::Task;

/// Parse a decimal or `0x` prefixed hexadecimal number.
fn parse_number<T>(text: &str) -> Result<T, String>
where
    T: TryFrom<u64>,
{
    let text = text.trim().replace('_', "");
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(digits) => u64::from_str_radix(digits, 16),
        None => text.parse(),
    }
    .map_err(|e| format!("invalid number '{text}': {e}"))?;
    T::try_from(value).map_err(|_| format!("number {value} is out of range"))
}

fn parse_u8(text: &str) -> Result<u8, String> {
    parse_number(text)
}

fn parse_u32(text: &str) -> Result<u32, String> {
    parse_number(text)
}

/// A binary file and the address it is placed at, written `FILE@OFFSET`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinSource {
    /// Binary file.
    pub path: PathBuf,
    /// Load address.
    pub offset: u32,
}

fn parse_bin_source(text: &str) -> Result<BinSource, String> {
    let (path, offset) = text
        .rsplit_once('@')
        .ok_or_else(|| format!("expected FILE@OFFSET, got '{text}'"))?;
    if path.is_empty() {
        return Err(format!("missing file in '{text}'"));
    }
    Ok(BinSource {
        path: PathBuf::from(path),
        offset: parse_u32(offset)?,
    })
}

/// Serial port commands.
#[derive(Debug, Subcommand)]
pub enum SerialCommand {
    /// List the serial ports present now
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Watch for ports being plugged or removed
    Scan {
        /// Stop after this many changes
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Print the frames received from a device
    Monitor(PortArgs),

    /// Send one frame to a device
    Send(SendCommand),
}

/// Device selection.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct PortArgs {
    /// Serial port name (e.g. /dev/ttyACM0, COM3)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Use an in-memory loopback device
    #[arg(long)]
    pub loopback: bool,
}

/// Send command arguments.
#[derive(Debug, Args)]
pub struct SendCommand {
    /// Target device
    #[command(flatten)]
    pub target: PortArgs,

    /// Source address
    #[arg(long, value_parser = parse_u8, default_value = "0")]
    pub source: u8,

    /// Destination address
    #[arg(long, value_parser = parse_u8, default_value = "0")]
    pub destination: u8,

    /// Payload as hex (e.g. 01ab)
    #[arg(long, default_value = "")]
    pub payload: String,

    /// Wait for a response frame
    #[arg(short, long)]
    pub wait: bool,

    /// Response timeout in milliseconds (defaults to the configured one)
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

/// Intel HEX commands.
#[derive(Debug, Subcommand)]
pub enum HexCommand {
    /// Convert a binary file to HEX
    FromBin {
        /// Binary file
        src: PathBuf,

        /// Load address (decimal or 0x hex)
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        offset: u32,

        /// Output HEX file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Merge binary files into one HEX file
    MergeBin {
        /// Sources as FILE@OFFSET
        #[arg(required = true, value_parser = parse_bin_source)]
        sources: Vec<BinSource>,

        /// Output HEX file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Merge HEX files, later files win on overlap
    MergeHex {
        /// HEX files
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Output HEX file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Describe a HEX file
    Info {
        /// HEX file
        file: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Convert a HEX file to a flat binary
    ToBin {
        /// HEX file
        file: PathBuf,

        /// Output binary file
        #[arg(short, long)]
        out: PathBuf,

        /// Byte used for gaps
        #[arg(long, value_parser = parse_u8, default_value = "0xFF")]
        padding: u8,

        /// Pad the output length to a multiple of this
        #[arg(long, default_value = "0")]
        align: usize,
    },
}

/// CRC commands.
#[derive(Debug, Subcommand)]
pub enum CrcCommand {
    /// List the available models
    Models,

    /// Compute a CRC
    Compute(CrcComputeCommand),
}

/// CRC compute arguments.
#[derive(Debug, Args)]
pub struct CrcComputeCommand {
    /// Model name (e.g. CRC-16/CCITT-FALSE)
    pub model: String,

    /// Input data.
    #[command(flatten)]
    pub input: DataArgs,
}

/// Input data for a computation.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct DataArgs {
    /// Text, used as UTF-8 bytes
    #[arg(long)]
    pub text: Option<String>,

    /// Bytes as hex
    #[arg(long)]
    pub hex: Option<String>,

    /// File contents
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// COBS commands.
#[derive(Debug, Subcommand)]
pub enum CobsCommand {
    /// Encode hex bytes
    Encode {
        /// Bytes as hex
        data: String,
    },

    /// Decode hex bytes
    Decode {
        /// Bytes as hex
        data: String,
    },
}

/// Version control system used for the build number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum VcsArg {
    /// Short commit hash
    #[default]
    Git,
    /// Last revision number
    Svn,
}

/// Firmware version commands.
#[derive(Debug, Subcommand)]
pub enum VersionCommand {
    /// Print the stored version
    Show {
        /// Version file or its directory
        file: PathBuf,
    },

    /// Bump the stored version
    Bump {
        /// Version file or its directory
        file: PathBuf,

        /// Part to bump: major, minor or build
        #[arg(value_name = "PART")]
        part: String,
    },

    /// Update the build number from version control
    Update(VersionUpdateCommand),
}

/// Version update arguments.
#[derive(Debug, Args)]
pub struct VersionUpdateCommand {
    /// Version file or its directory
    pub file: PathBuf,

    /// Repository root (defaults to the current directory)
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Version control system
    #[arg(long, value_enum, default_value_t)]
    pub vcs: VcsArg,

    /// Also export a C header
    #[arg(long)]
    pub header: Option<PathBuf>,

    /// Header author
    #[arg(long, default_value = "")]
    pub author: String,

    /// Header note
    #[arg(long, default_value = "")]
    pub note: String,
}

/// Headless IDE builds.
#[derive(Debug, Subcommand)]
pub enum BuildCommand {
    /// Clean build with STM32CubeIDE
    Cubeide {
        /// Project name
        #[arg(long)]
        name: String,

        /// Build configuration (e.g. Debug)
        #[arg(long)]
        configuration: String,

        /// Project directory
        #[arg(long)]
        project: PathBuf,

        /// Workspace directory
        #[arg(long)]
        workspace: PathBuf,

        /// Run the indexer
        #[arg(long)]
        indexer: bool,

        /// Log file
        #[arg(long)]
        log: Option<PathBuf>,

        /// Echo the build output
        #[arg(long)]
        pipe: bool,
    },

    /// Build with IAR Embedded Workbench
    Iar {
        /// Build configuration (e.g. Debug)
        #[arg(long)]
        configuration: String,

        /// EWARM project file
        #[arg(long)]
        project: PathBuf,

        /// Log file
        #[arg(long)]
        log: Option<PathBuf>,

        /// Echo the build output
        #[arg(long)]
        pipe: bool,
    },
}

/// Developer task name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskArg {
    /// Build the API documentation
    Docs,
    /// Print the documentation index URL
    Html,
    /// Run the test suite
    Test,
    /// Print the workspace version
    Version,
    /// Set the workspace version to today's date
    BumpVersion,
    /// Run the tests with a coverage threshold
    CheckCoverage,
    /// Check formatting and lints
    CheckLinter,
    /// Type check all targets
    CheckTypes,
}

impl From<TaskArg> for Task {
    fn from(arg: TaskArg) -> Self {
        match arg {
            TaskArg::Docs => Self::Docs,
            TaskArg::Html => Self::Html,
            TaskArg::Test => Self::Test,
            TaskArg::Version => Self::Version,
            TaskArg::BumpVersion => Self::BumpVersion,
            TaskArg::CheckCoverage => Self::CheckCoverage,
            TaskArg::CheckLinter => Self::CheckLinter,
            TaskArg::CheckTypes => Self::CheckTypes,
        }
    }
}

/// Task command arguments.
#[derive(Debug, Args)]
pub struct TaskCommand {
    /// Task to run
    #[arg(value_enum)]
    pub name: TaskArg,

    /// Workspace root
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "plain")]
        format: OutputFormat,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_u32("1024"), Ok(1024));
        assert_eq!(parse_u32("0x0800_0000"), Ok(0x0800_0000));
        assert_eq!(parse_u8("0XFF"), Ok(0xFF));
        assert!(parse_u8("256").is_err());
        assert!(parse_u32("0xZZ").is_err());
        assert!(parse_u32("").is_err());
    }

    #[test]
    fn test_parse_bin_source() {
        let source = parse_bin_source("boot.bin@0x08000000").unwrap();
        assert_eq!(source.path, PathBuf::from("boot.bin"));
        assert_eq!(source.offset, 0x0800_0000);

        let source = parse_bin_source("dir@v1/app.bin@4096").unwrap();
        assert_eq!(source.path, PathBuf::from("dir@v1/app.bin"));
        assert_eq!(source.offset, 4096);

        assert!(parse_bin_source("app.bin").is_err());
        assert!(parse_bin_source("@0x10").is_err());
    }

    #[test]
    fn test_task_arg_conversion() {
        assert_eq!(Task::from(TaskArg::BumpVersion), Task::BumpVersion);
        assert_eq!(Task::from(TaskArg::CheckLinter), Task::CheckLinter);
        for task in Task::ALL {
            let arg = TaskArg::from_str(task.name(), false).unwrap();
            assert_eq!(Task::from(arg), task);
        }
    }

    #[test]
    fn test_build_configuration_flag() {
        let cmd = BuildCommand::Iar {
            configuration: "Release".to_string(),
            project: PathBuf::from("fw.ewp"),
            log: None,
            pipe: false,
        };
        assert!(format!("{cmd:?}").contains("Release"));
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
        assert_eq!(VcsArg::default(), VcsArg::Git);
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show {
            format: OutputFormat::Yaml,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
        assert!(debug_str.contains("Yaml"));
    }
}
