//! Serial devices with independent read and write halves.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serialport::{DataBits, Parity, StopBits};
use tracing::{debug, info, warn};

use super::scan::DeviceList;
use crate::error::{Error, Result};
use crate::usb_id::UsbId;

/// Port name of the in-memory loopback device.
pub const LOOPBACK_PORT: &str = "loop://";

/// USB id reported by the loopback device.
pub const LOOPBACK_ID: UsbId = UsbId::from_raw(0xDEAD_BEEF);

/// Line settings applied when a device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate.
    pub baud_rate: u32,
    /// Bits per character.
    pub data_bits: DataBits,
    /// Parity checking mode.
    pub parity: Parity,
    /// Stop bits.
    pub stop_bits: StopBits,
    /// Read timeout.
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Port name and USB id of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceInfo {
    /// System port name.
    pub port: String,
    /// USB vendor and product id.
    pub id: UsbId,
}

impl DeviceInfo {
    /// Create a device description.
    #[must_use]
    pub fn new(port: impl Into<String>, id: UsbId) -> Self {
        Self {
            port: port.into(),
            id,
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.port, self.id)
    }
}

#[derive(Debug, Default)]
struct LoopbackBuffer {
    data: Mutex<VecDeque<u8>>,
    ready: Condvar,
}

struct LoopbackReader {
    buffer: Arc<LoopbackBuffer>,
    timeout: Duration,
}

impl Read for LoopbackReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let data = self
            .buffer
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (mut data, _) = self
            .buffer
            .ready
            .wait_timeout_while(data, self.timeout, |data| data.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        if data.is_empty() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        let count = buf.len().min(data.len());
        for (slot, byte) in buf.iter_mut().zip(data.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

struct LoopbackWriter {
    buffer: Arc<LoopbackBuffer>,
}

impl Write for LoopbackWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(buf);
        self.buffer.ready.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Backend {
    Port,
    Loopback(Arc<LoopbackBuffer>),
}

type ReadHalf = Box<dyn Read + Send>;
type WriteHalf = Box<dyn Write + Send>;

fn lock_half<T>(half: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    half.lock()
        .map_err(|_| Error::internal("serial device lock poisoned"))
}

/// A serial port, or an in-memory loopback.
///
/// All methods take `&self`: the device is shared between a stream worker
/// (reading) and senders (writing). Reads and writes lock separate halves.
pub struct Device {
    info: DeviceInfo,
    settings: SerialSettings,
    backend: Backend,
    open: AtomicBool,
    reader: Mutex<Option<ReadHalf>>,
    writer: Mutex<Option<WriteHalf>>,
}

impl Device {
    fn with_backend(info: DeviceInfo, settings: SerialSettings, backend: Backend) -> Self {
        debug!(port = %info.port, id = %info.id, "Device created");
        Self {
            info,
            settings,
            backend,
            open: AtomicBool::new(false),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Device for a system port. The USB id is looked up in the port list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortNotFound`] if the port is not connected, or an
    /// error if the port list can't be read.
    pub fn open_port(port: &str, settings: SerialSettings) -> Result<Self> {
        let info = DeviceList::scan()?
            .filter(Some(port), None)
            .into_iter()
            .next()
            .ok_or_else(|| Error::PortNotFound {
                port: port.to_string(),
            })?;
        Ok(Self::with_backend(info, settings, Backend::Port))
    }

    /// Device for a known port and id, without checking the system.
    #[must_use]
    pub fn from_info(info: DeviceInfo, settings: SerialSettings) -> Self {
        Self::with_backend(info, settings, Backend::Port)
    }

    /// In-memory device that reads back everything written to it.
    #[must_use]
    pub fn loopback(settings: SerialSettings) -> Self {
        Self::with_backend(
            DeviceInfo::new(LOOPBACK_PORT, LOOPBACK_ID),
            settings,
            Backend::Loopback(Arc::default()),
        )
    }

    /// Port name and USB id.
    #[must_use]
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// System port name.
    #[must_use]
    pub fn port(&self) -> &str {
        &self.info.port
    }

    /// USB id.
    #[must_use]
    pub fn id(&self) -> UsbId {
        self.info.id
    }

    /// Line settings.
    #[must_use]
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// True for the in-memory loopback.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        matches!(self.backend, Backend::Loopback(_))
    }

    /// True while the device is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Open the device. Opening an open device does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortNotFound`] if the port is gone, or the driver
    /// error if it can't be opened.
    pub fn open(&self) -> Result<()> {
        let mut reader = lock_half(&self.reader)?;
        if reader.is_some() {
            return Ok(());
        }
        let mut writer = lock_half(&self.writer)?;

        let (read_half, write_half): (ReadHalf, WriteHalf) = match &self.backend {
            Backend::Loopback(buffer) => (
                Box::new(LoopbackReader {
                    buffer: Arc::clone(buffer),
                    timeout: self.settings.timeout,
                }),
                Box::new(LoopbackWriter {
                    buffer: Arc::clone(buffer),
                }),
            ),
            Backend::Port => {
                self.check_connected()?;
                let port = serialport::new(&self.info.port, self.settings.baud_rate)
                    .data_bits(self.settings.data_bits)
                    .parity(self.settings.parity)
                    .stop_bits(self.settings.stop_bits)
                    .timeout(self.settings.timeout)
                    .open()?;
                let write_half = port.try_clone()?;
                (Box::new(port), Box::new(write_half))
            }
        };

        *reader = Some(read_half);
        *writer = Some(write_half);
        self.open.store(true, Ordering::SeqCst);
        info!(port = %self.info.port, baud_rate = self.settings.baud_rate, "Port opened");
        Ok(())
    }

    fn check_connected(&self) -> Result<()> {
        let found = DeviceList::scan()?.filter(Some(self.info.port.as_str()), None);
        match found.first() {
            None => Err(Error::PortNotFound {
                port: self.info.port.clone(),
            }),
            Some(current) if current.id != self.info.id => {
                warn!(
                    port = %self.info.port,
                    expected = %self.info.id,
                    found = %current.id,
                    "Port changed its USB id"
                );
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    /// Flush pending output and close the device.
    ///
    /// # Errors
    ///
    /// Returns an error if a device lock is poisoned.
    pub fn close(&self) -> Result<()> {
        if let Err(e) = self.flush() {
            debug!(port = %self.info.port, error = %e, "Flush before close failed");
        }
        let had_reader = lock_half(&self.reader)?.take().is_some();
        let had_writer = lock_half(&self.writer)?.take().is_some();
        self.open.store(false, Ordering::SeqCst);
        if had_reader || had_writer {
            info!(port = %self.info.port, "Port closed");
        }
        Ok(())
    }

    /// Wait until buffered output has been sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOpen`] on a closed device or
    /// [`Error::Disconnected`] if the port failed.
    pub fn flush(&self) -> Result<()> {
        let mut guard = lock_half(&self.writer)?;
        let writer = guard.as_mut().ok_or_else(|| self.not_open())?;
        if let Err(e) = writer.flush() {
            *guard = None;
            drop(guard);
            return Err(self.disconnect_after_write(&e));
        }
        Ok(())
    }

    /// Write all of `data`. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOpen`] on a closed device or
    /// [`Error::Disconnected`] if the port failed.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let mut guard = lock_half(&self.writer)?;
        let writer = guard.as_mut().ok_or_else(|| self.not_open())?;
        if let Err(e) = writer.write_all(data) {
            *guard = None;
            drop(guard);
            return Err(self.disconnect_after_write(&e));
        }
        Ok(data.len())
    }

    /// Read up to `size` bytes. Returns fewer when the read timeout expires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOpen`] on a closed device or
    /// [`Error::Disconnected`] if the port failed.
    pub fn read(&self, size: usize) -> Result<Vec<u8>> {
        let mut guard = lock_half(&self.reader)?;
        let reader = guard.as_mut().ok_or_else(|| self.not_open())?;

        let mut data = vec![0u8; size];
        let mut filled = 0;
        let deadline = Instant::now() + self.settings.timeout;
        while filled < size {
            match reader.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(count) => filled += count,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    *guard = None;
                    drop(guard);
                    return Err(self.disconnect_after_read(&e));
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        data.truncate(filled);
        Ok(data)
    }

    /// Read until the data ends with `expected`, `limit` bytes were read or
    /// the read timeout expires.
    ///
    /// # Errors
    ///
    /// Same as [`Device::read`].
    pub fn read_until(&self, expected: &[u8], limit: Option<usize>) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        loop {
            let byte = self.read(1)?;
            if byte.is_empty() {
                break;
            }
            data.extend(byte);
            if !expected.is_empty() && data.ends_with(expected) {
                break;
            }
            if limit.is_some_and(|limit| data.len() >= limit) {
                break;
            }
        }
        Ok(data)
    }

    fn not_open(&self) -> Error {
        Error::NotOpen {
            port: self.info.port.clone(),
        }
    }

    fn disconnect_after_read(&self, err: &io::Error) -> Error {
        if let Ok(mut writer) = lock_half(&self.writer) {
            writer.take();
        }
        self.mark_lost(err)
    }

    fn disconnect_after_write(&self, err: &io::Error) -> Error {
        if let Ok(mut reader) = lock_half(&self.reader) {
            reader.take();
        }
        self.mark_lost(err)
    }

    fn mark_lost(&self, err: &io::Error) -> Error {
        self.open.store(false, Ordering::SeqCst);
        warn!(port = %self.info.port, error = %err, "Port disconnected");
        Error::disconnected(self.info.port.clone(), err.to_string())
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("port", &self.info.port)
            .field("id", &self.info.id)
            .field("settings", &self.settings)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
