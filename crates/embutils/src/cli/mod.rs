//! Command-line interface for embutils.
//!
//! This module provides the CLI structure for the `embutils` binary. The
//! handlers live in the binary itself.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    BinSource, BuildCommand, CobsCommand, ConfigCommand, CrcCommand, CrcComputeCommand, DataArgs,
    HexCommand, OutputFormat, PortArgs, SendCommand, SerialCommand, TaskArg, TaskCommand, VcsArg,
    VersionCommand, VersionUpdateCommand,
};

/// embutils - Embedded development utilities
///
/// Serial device monitoring, firmware image conversion, checksums and
/// repository maintenance for embedded projects.
#[derive(Debug, Parser)]
#[command(name = "embutils")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serial ports and devices
    #[command(subcommand)]
    Serial(SerialCommand),

    /// Intel HEX conversions
    #[command(subcommand)]
    Hex(HexCommand),

    /// CRC models and checksums
    #[command(subcommand)]
    Crc(CrcCommand),

    /// COBS encoding
    #[command(subcommand)]
    Cobs(CobsCommand),

    /// Firmware version files
    #[command(subcommand)]
    Version(VersionCommand),

    /// Headless IDE builds
    #[command(subcommand)]
    Build(BuildCommand),

    /// Run a developer task
    Task(TaskCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}
