//! Serial port discovery and hot-plug detection.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serialport::SerialPortType;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::device::DeviceInfo;
use crate::error::{Error, Result};
use crate::usb_id::UsbId;

/// Default time between scans.
pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_millis(500);

const EVENT_CAPACITY: usize = 16;

/// Ordered list of serial devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeviceList(Vec<DeviceInfo>);

impl DeviceList {
    /// Wrap a list of devices.
    #[must_use]
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self(devices)
    }

    /// USB serial ports currently connected to the system.
    ///
    /// Ports without a USB VID/PID are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the system port list can't be read.
    pub fn scan() -> Result<Self> {
        let ports = serialport::available_ports()?;
        let devices = ports
            .into_iter()
            .filter_map(|port| match port.port_type {
                SerialPortType::UsbPort(usb) => {
                    Some(DeviceInfo::new(port.port_name, UsbId::new(usb.vid, usb.pid)))
                }
                _ => None,
            })
            .collect();
        Ok(Self(devices))
    }

    /// Entries of the longer list that the shorter one lacks.
    ///
    /// Empty when both lists are equal.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Self {
        if self == other {
            return Self::default();
        }
        let (base, comp) = if self.len() > other.len() {
            (self, other)
        } else {
            (other, self)
        };
        Self(
            base.iter()
                .filter(|device| !comp.contains(device))
                .cloned()
                .collect(),
        )
    }

    /// Devices matching `port` and `id`, each when given.
    #[must_use]
    pub fn filter(&self, port: Option<&str>, id: Option<UsbId>) -> Self {
        Self(
            self.iter()
                .filter(|device| port.is_none_or(|port| device.port == port))
                .filter(|device| id.is_none_or(|id| device.id == id))
                .cloned()
                .collect(),
        )
    }

    /// The wrapped devices.
    #[must_use]
    pub fn into_inner(self) -> Vec<DeviceInfo> {
        self.0
    }
}

impl Deref for DeviceList {
    type Target = [DeviceInfo];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for DeviceList {
    type Item = DeviceInfo;
    type IntoIter = std::vec::IntoIter<DeviceInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<Vec<DeviceInfo>> for DeviceList {
    fn from(devices: Vec<DeviceInfo>) -> Self {
        Self(devices)
    }
}

/// How the device list changed between two scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEventKind {
    /// Same length, different devices.
    ListChanged,
    /// One device appeared.
    PluggedSingle,
    /// Several devices appeared.
    PluggedMulti,
    /// One device disappeared.
    RemovedSingle,
    /// Several devices disappeared.
    RemovedMulti,
}

impl ScanEventKind {
    /// Compare two scans. Returns the change and the devices involved, or
    /// `None` when nothing changed.
    #[must_use]
    pub fn classify(old: &DeviceList, new: &DeviceList) -> Option<(Self, DeviceList)> {
        let diff = old.diff(new);
        if diff.is_empty() {
            return None;
        }
        let multi = diff.len() > 1;
        let kind = match new.len().cmp(&old.len()) {
            std::cmp::Ordering::Greater if multi => Self::PluggedMulti,
            std::cmp::Ordering::Greater => Self::PluggedSingle,
            std::cmp::Ordering::Less if multi => Self::RemovedMulti,
            std::cmp::Ordering::Less => Self::RemovedSingle,
            std::cmp::Ordering::Equal => Self::ListChanged,
        };
        Some((kind, diff))
    }
}

/// Published by a [`DeviceScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A scan completed.
    Period,
    /// The device list differs from the last reported one.
    Changed {
        /// Kind of change.
        kind: ScanEventKind,
        /// Devices that were added or removed.
        devices: DeviceList,
    },
}

/// Periodic device scanner running as a tokio task.
#[derive(Debug)]
pub struct DeviceScanner {
    running: Arc<AtomicBool>,
    devices: Arc<Mutex<DeviceList>>,
    events: broadcast::Sender<ScanEvent>,
    task: Option<JoinHandle<()>>,
}

impl DeviceScanner {
    /// Start scanning system ports every `period`.
    ///
    /// Port enumeration blocks, so every scan runs on the blocking pool.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub async fn start(period: Duration) -> Self {
        Self::start_with(period, DeviceList::scan).await
    }

    /// Start scanning with a custom device source.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub async fn start_with<F>(period: Duration, source: F) -> Self
    where
        F: Fn() -> Result<DeviceList> + Send + Sync + 'static,
    {
        let source = Arc::new(source);
        let initial = scan_blocking(&source).await.unwrap_or_else(|e| {
            warn!(error = %e, "Initial device scan failed");
            DeviceList::default()
        });
        let running = Arc::new(AtomicBool::new(true));
        let devices = Arc::new(Mutex::new(initial));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        debug!(period_ms = period.as_millis(), "Starting device scanner");
        let task = tokio::spawn(scan_loop(
            period,
            source,
            Arc::clone(&running),
            Arc::clone(&devices),
            events.clone(),
        ));

        Self {
            running,
            devices,
            events,
            task: Some(task),
        }
    }

    /// Devices found by the latest scan.
    #[must_use]
    pub fn devices(&self) -> DeviceList {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Receive scan events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Check if the scanner is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the scanner and wait for its task to end.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            info!("Scanner stopped");
        }
    }
}

impl Drop for DeviceScanner {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn scan_blocking<F>(source: &Arc<F>) -> Result<DeviceList>
where
    F: Fn() -> Result<DeviceList> + Send + Sync + 'static,
{
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || source())
        .await
        .map_err(|e| Error::internal(format!("device scan task failed: {e}")))?
}

async fn scan_loop<F>(
    period: Duration,
    source: Arc<F>,
    running: Arc<AtomicBool>,
    devices: Arc<Mutex<DeviceList>>,
    events: broadcast::Sender<ScanEvent>,
) where
    F: Fn() -> Result<DeviceList> + Send + Sync + 'static,
{
    info!("Scanner started");
    let mut reported = DeviceList::default();
    let mut ticker = interval(period);

    while running.load(Ordering::SeqCst) {
        ticker.tick().await;
        let list = match scan_blocking(&source).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Device scan failed");
                continue;
            }
        };

        let change = if events.receiver_count() > 0 {
            ScanEventKind::classify(&reported, &list)
        } else {
            None
        };
        if change.is_some() {
            reported = list.clone();
        }
        *devices.lock().unwrap_or_else(PoisonError::into_inner) = list;

        if let Some((kind, changed)) = change {
            info!(kind = ?kind, devices = changed.len(), "Device list changed");
            let _ = events.send(ScanEvent::Changed {
                kind,
                devices: changed,
            });
        }
        let _ = events.send(ScanEvent::Period);
    }
}
