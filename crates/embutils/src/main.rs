//! `embutils` - CLI for embedded development utilities
//!
//! This binary exposes the serial, image, checksum and repository tools of
//! the embutils library.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use embutils::cli::{
    BuildCommand, Cli, CobsCommand, Command, ConfigCommand, CrcCommand, CrcComputeCommand,
    DataArgs, HexCommand, OutputFormat, PortArgs, SendCommand, SerialCommand, TaskCommand,
    VcsArg, VersionCommand, VersionUpdateCommand,
};
use embutils::hex::files::{bin_to_hex, hex_to_bin, merge_bin, merge_hex};
use embutils::parsed::{ParseFormat, ParseModel};
use embutils::repo::{
    build_cubeide, build_iar, CHeaderExporter, GitBuildUpdater, SimpleVersionStorage,
    SvnBuildUpdater, TaskRunner, VersionHandler, VersionStorage,
};
use embutils::serial::{DeviceList, ScanEvent, SerialSettings};
use embutils::{
    cobs, init_logging, CobsCodec, Config, Crc, CrcPreset, Device, DeviceScanner, IntelHex,
    Interface, SimpleFrame, Stream, StreamEvent,
};

type FrameCodec = CobsCodec<SimpleFrame>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration lazily so `config` commands work with a broken file
    let config_path = cli.config.clone();
    let load = || Config::load_from(config_path.clone());

    // Execute the command
    match cli.command {
        Command::Serial(serial_cmd) => handle_serial(&load()?, serial_cmd).await,
        Command::Hex(hex_cmd) => handle_hex(&load()?, hex_cmd),
        Command::Crc(crc_cmd) => handle_crc(&crc_cmd),
        Command::Cobs(cobs_cmd) => handle_cobs(&cobs_cmd),
        Command::Version(version_cmd) => handle_version(version_cmd),
        Command::Build(build_cmd) => handle_build(&build_cmd),
        Command::Task(task_cmd) => handle_task(&load()?, &task_cmd),
        Command::Config(config_cmd) => handle_config(cli.config, config_cmd),
    }
}

async fn handle_serial(config: &Config, cmd: SerialCommand) -> anyhow::Result<()> {
    match cmd {
        SerialCommand::List { json } => {
            let devices = tokio::task::spawn_blocking(DeviceList::scan).await??;
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("No serial ports found.");
            } else {
                for device in devices.iter() {
                    println!("{device}");
                }
            }
            Ok(())
        }
        SerialCommand::Scan { count } => handle_scan(config, count).await,
        SerialCommand::Monitor(target) => handle_monitor(config, &target).await,
        SerialCommand::Send(send_cmd) => handle_send(config, send_cmd).await,
    }
}

fn select_device(target: &PortArgs, settings: SerialSettings) -> anyhow::Result<Device> {
    match (&target.port, target.loopback) {
        (_, true) => Ok(Device::loopback(settings)),
        (Some(port), false) => Ok(Device::open_port(port, settings)?),
        (None, false) => bail!("either --port or --loopback is required"),
    }
}

async fn handle_scan(config: &Config, count: Option<usize>) -> anyhow::Result<()> {
    let mut scanner = DeviceScanner::start(config.scan_period()).await;
    let mut events = scanner.subscribe();

    println!("Connected devices:");
    for device in scanner.devices().iter() {
        println!("  {device}");
    }
    println!("Watching for changes, press Ctrl+C to stop.");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut changes = 0;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Ok(ScanEvent::Changed { kind, devices }) => {
                    println!("{kind:?}:");
                    for device in devices.iter() {
                        println!("  {device}");
                    }
                    changes += 1;
                    if count.is_some_and(|limit| changes >= limit) {
                        break;
                    }
                }
                Ok(ScanEvent::Period) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Scan events lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    scanner.stop().await;
    Ok(())
}

fn describe(frame: &SimpleFrame) -> String {
    format!(
        "0x{:02X} -> 0x{:02X} [{}] {}",
        frame.source(),
        frame.destination(),
        frame.length(),
        hex::encode(frame.payload())
    )
}

async fn handle_monitor(config: &Config, target: &PortArgs) -> anyhow::Result<()> {
    let device = select_device(target, config.serial_settings()?)?;
    let stream = Stream::start(device, FrameCodec::new(), &config.stream)?;
    let mut events = stream.subscribe();
    println!("Monitoring {}, press Ctrl+C to stop.", stream.device().info());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Ok(StreamEvent::Received(frame)) => println!("{}", describe(&frame)),
                Ok(StreamEvent::Connected) => println!("Connected."),
                Ok(StreamEvent::Reconnected) => println!("Reconnected."),
                Ok(StreamEvent::Disconnected) => println!("Disconnected, retrying..."),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Monitor lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    shutdown(stream).await
}

async fn handle_send(config: &Config, cmd: SendCommand) -> anyhow::Result<()> {
    let payload = hex::decode(cmd.payload.trim()).context("payload is not valid hex")?;
    let frame = SimpleFrame::new(cmd.source, cmd.destination, payload)?;
    let device = select_device(&cmd.target, config.interface_settings()?)?;
    let mut interface = Interface::new(FrameCodec::new(), device, config)?;
    let wait = cmd
        .timeout_ms
        .map_or_else(|| interface.timeout(), Duration::from_millis);

    if !interface.wait_connected(wait).await {
        bail!("device {} did not connect", interface.stream().device().port());
    }

    if cmd.wait {
        let response = interface.request(&frame, |_: &SimpleFrame| true, Some(wait)).await?;
        println!("{}", describe(&response));
    } else {
        let written = interface.send(&frame)?;
        println!("Sent {written} bytes.");
    }

    interface.stop();
    tokio::task::spawn_blocking(move || interface.join()).await??;
    Ok(())
}

async fn shutdown(mut stream: Stream<FrameCodec>) -> anyhow::Result<()> {
    stream.stop();
    tokio::task::spawn_blocking(move || stream.join()).await??;
    Ok(())
}

fn handle_hex(config: &Config, cmd: HexCommand) -> anyhow::Result<()> {
    let record_bytes = config.hex.record_bytes;
    match cmd {
        HexCommand::FromBin { src, offset, out } => {
            let image = bin_to_hex(&src, offset, Some(&out), record_bytes)?;
            println!("Wrote {} bytes at 0x{offset:08X} to {}", image.len(), out.display());
        }
        HexCommand::MergeBin { sources, out } => {
            let sources: Vec<(PathBuf, u32)> = sources
                .into_iter()
                .map(|source| (source.path, source.offset))
                .collect();
            let image = merge_bin(&sources, &out, record_bytes)?;
            println!("Merged {} files ({} bytes) into {}", sources.len(), image.len(), out.display());
        }
        HexCommand::MergeHex { sources, out } => {
            let image = merge_hex(&sources, &out, record_bytes)?;
            println!("Merged {} files ({} bytes) into {}", sources.len(), image.len(), out.display());
        }
        HexCommand::Info { file, json } => print_hex_info(&file, json)?,
        HexCommand::ToBin {
            file,
            out,
            padding,
            align,
        } => {
            let data = hex_to_bin(&file, &out, padding, align, config.hex.max_bin_bytes)?;
            println!("Wrote {} bytes to {}", data.len(), out.display());
        }
    }
    Ok(())
}

fn print_hex_info(file: &Path, json: bool) -> anyhow::Result<()> {
    let image = IntelHex::from_hex_file(file)?;
    let segments = image.segments();
    let start = image.start_address().map(|start| format!("{start:?}"));

    if json {
        let info = serde_json::json!({
            "file": file,
            "bytes": image.len(),
            "min_address": image.min_address(),
            "max_address": image.max_address(),
            "segments": segments
                .iter()
                .map(|(start, end)| serde_json::json!({ "start": start, "end": end }))
                .collect::<Vec<_>>(),
            "start_address": start,
            "digest": image.digest(),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File:          {}", file.display());
    println!("Bytes:         {}", image.len());
    if let (Some(min), Some(max)) = (image.min_address(), image.max_address()) {
        println!("Range:         0x{min:08X} - 0x{max:08X}");
    }
    println!("Segments:      {}", segments.len());
    for (start, end) in &segments {
        println!("  0x{start:08X} - 0x{end:08X} ({} bytes)", end - u64::from(*start));
    }
    if let Some(start) = start {
        println!("Start address: {start}");
    }
    println!("BLAKE3:        {}", image.digest());
    Ok(())
}

fn input_bytes(input: &DataArgs) -> anyhow::Result<Vec<u8>> {
    if let Some(text) = &input.text {
        return Ok(text.as_bytes().to_vec());
    }
    if let Some(data) = &input.hex {
        return hex::decode(data.trim()).context("input is not valid hex");
    }
    if let Some(file) = &input.file {
        return std::fs::read(file).with_context(|| format!("can't read {}", file.display()));
    }
    bail!("one of --text, --hex or --file is required")
}

fn handle_crc(cmd: &CrcCommand) -> anyhow::Result<()> {
    match cmd {
        CrcCommand::Models => {
            println!("{:<20} {:>5} {:>12} {:>12}", "Model", "Width", "Poly", "Check");
            for preset in CrcPreset::ALL {
                let model = preset.model();
                println!(
                    "{:<20} {:>5} {:>#12X} {:>#12X}",
                    preset.name(),
                    model.width,
                    model.poly,
                    preset.check()
                );
            }
        }
        CrcCommand::Compute(CrcComputeCommand { model, input }) => {
            let preset: CrcPreset = model.parse()?;
            let crc = Crc::from(preset);
            let value = crc.compute(&input_bytes(input)?);
            let digits = crc.width().div_ceil(4) as usize;
            println!("{}: 0x{value:0digits$X}", crc.name());
        }
    }
    Ok(())
}

fn handle_cobs(cmd: &CobsCommand) -> anyhow::Result<()> {
    match cmd {
        CobsCommand::Encode { data } => {
            let bytes = hex::decode(data.trim()).context("input is not valid hex")?;
            println!("{}", hex::encode(cobs::encode(&bytes)));
        }
        CobsCommand::Decode { data } => {
            let bytes = hex::decode(data.trim()).context("input is not valid hex")?;
            println!("{}", hex::encode(cobs::decode(&bytes)?));
        }
    }
    Ok(())
}

fn handle_version(cmd: VersionCommand) -> anyhow::Result<()> {
    match cmd {
        VersionCommand::Show { file } => {
            let version = SimpleVersionStorage::new(&file, true).load()?;
            println!("{version}");
        }
        VersionCommand::Bump { file, part } => {
            let storage = SimpleVersionStorage::new(&file, true);
            let version = VersionHandler::new(storage).run(Some(&part))?;
            println!("{version}");
        }
        VersionCommand::Update(update) => {
            let version = update_version(update)?;
            println!("{version}");
        }
    }
    Ok(())
}

fn update_version(cmd: VersionUpdateCommand) -> anyhow::Result<embutils::Version> {
    let storage = SimpleVersionStorage::new(&cmd.file, true);
    let mut handler = match cmd.vcs {
        VcsArg::Git => VersionHandler::new(storage).with_updater(GitBuildUpdater::new(&cmd.repo)),
        VcsArg::Svn => VersionHandler::new(storage).with_updater(SvnBuildUpdater::new(&cmd.repo)),
    };
    if let Some(header) = cmd.header {
        handler = handler.with_exporter(CHeaderExporter::new(header, cmd.author, cmd.note));
    }
    Ok(handler.run(None)?)
}

fn handle_build(cmd: &BuildCommand) -> anyhow::Result<()> {
    match cmd {
        BuildCommand::Cubeide {
            name,
            configuration,
            project,
            workspace,
            indexer,
            log,
            pipe,
        } => build_cubeide(
            name,
            configuration,
            project,
            workspace,
            *indexer,
            log.as_deref(),
            *pipe,
        )?,
        BuildCommand::Iar {
            configuration,
            project,
            log,
            pipe,
        } => build_iar(configuration, project, log.as_deref(), *pipe)?,
    }
    println!("Build finished.");
    Ok(())
}

fn handle_task(config: &Config, cmd: &TaskCommand) -> anyhow::Result<()> {
    let runner = TaskRunner::new(&cmd.root, config.tasks.coverage_threshold);
    runner.run(cmd.name.into())?;
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { format } => {
            let config = Config::load_from(config_path)?;
            match format {
                OutputFormat::Json => println!("{}", config.export(ParseFormat::Json)?),
                OutputFormat::Yaml => print!("{}", config.export(ParseFormat::Yaml)?),
                OutputFormat::Plain => print_config(&config),
            }
        }
        ConfigCommand::Path => {
            let path = config_path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            Config::load_from(Some(path)).context("configuration is invalid")?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

fn print_config(config: &Config) {
    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("[Serial]");
    println!("  Baud rate:          {}", config.serial.baud_rate);
    println!("  Data bits:          {}", config.serial.data_bits);
    println!("  Parity:             {}", config.serial.parity);
    println!("  Stop bits:          {}", config.serial.stop_bits);
    println!("  Timeout (ms):       {}", config.serial.timeout_ms);
    println!();
    println!("[Stream]");
    println!("  Reconnect (ms):     {}", config.stream.reconnect_period_ms);
    println!("  Task delay (ms):    {}", config.stream.task_delay_ms);
    println!("  Channel capacity:   {}", config.stream.channel_capacity);
    println!();
    println!("[Interface]");
    println!("  Response (ms):      {}", config.interface.response_timeout_ms);
    println!("  Baud rate:          {}", config.interface.baud_rate);
    println!();
    println!("[Scanner]");
    println!("  Period (ms):        {}", config.scanner.period_ms);
    println!();
    println!("[Hex]");
    println!("  Record bytes:       {}", config.hex.record_bytes);
    println!("  Max binary bytes:   {}", config.hex.max_bin_bytes);
    println!();
    println!("[Tasks]");
    println!("  Coverage threshold: {}", config.tasks.coverage_threshold);
}
