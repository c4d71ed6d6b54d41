//! Item streams over serial devices.
//!
//! A [`Stream`] owns a worker thread that decodes items from its device and
//! publishes them, together with connection changes, as [`StreamEvent`]s.
//! Connection failures trigger a reconnect cycle; decode failures only drop
//! the bad frame.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::device::Device;
use crate::codec::StreamCodec;
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::service::{Service, ServiceHandle, ServiceState, ServiceTask};

/// Name of the stream worker thread.
const STREAM_NAME: &str = "embutils-stream";

/// Published by a [`Stream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent<T> {
    /// The device was opened when the stream started or resumed.
    Connected,
    /// The device was opened again after a disconnection.
    Reconnected,
    /// The device connection was lost.
    Disconnected,
    /// An item was decoded.
    Received(T),
}

struct Shared<C: StreamCodec> {
    device: Mutex<Arc<Device>>,
    codec: Arc<C>,
    events: broadcast::Sender<StreamEvent<C::Item>>,
    reconnect_period: Duration,
}

impl<C: StreamCodec> Shared<C> {
    fn device(&self) -> Arc<Device> {
        Arc::clone(&self.device.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn emit(&self, event: StreamEvent<C::Item>) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

struct StreamWorker<C: StreamCodec> {
    shared: Arc<Shared<C>>,
}

impl<C: StreamCodec> StreamWorker<C> {
    /// Open the device, retrying while the service keeps running.
    fn connect(&self, handle: &ServiceHandle) -> bool {
        loop {
            if !handle.is_running() {
                return false;
            }
            let device = self.shared.device();
            match device.open() {
                Ok(()) => return true,
                Err(e) => {
                    debug!(port = %device.port(), error = %e, "Connection attempt failed");
                    thread::sleep(self.shared.reconnect_period);
                }
            }
        }
    }

    fn close(&self) {
        let device = self.shared.device();
        if let Err(e) = device.close() {
            warn!(port = %device.port(), error = %e, "Failed to close device");
        }
    }
}

impl<C: StreamCodec> ServiceTask for StreamWorker<C> {
    fn name(&self) -> &str {
        STREAM_NAME
    }

    fn on_start(&mut self, handle: &ServiceHandle) {
        if self.connect(handle) {
            self.shared.emit(StreamEvent::Connected);
        }
    }

    fn task(&mut self, handle: &ServiceHandle) {
        let device = self.shared.device();
        match self.shared.codec.decode_stream(&device) {
            Ok(Some(item)) => {
                debug!(port = %device.port(), item = ?item, "Received");
                self.shared.emit(StreamEvent::Received(item));
            }
            Ok(None) => {}
            Err(e) if e.is_disconnect() => {
                warn!(port = %device.port(), error = %e, "Stream disconnected");
                self.shared.emit(StreamEvent::Disconnected);
                if self.connect(handle) {
                    info!(port = %self.shared.device().port(), "Stream reconnected");
                    self.shared.emit(StreamEvent::Reconnected);
                }
            }
            Err(e) => warn!(port = %device.port(), error = %e, "Stream read failed"),
        }
    }

    fn on_pause(&mut self) {
        self.close();
    }

    fn on_resume(&mut self, handle: &ServiceHandle) {
        if self.connect(handle) {
            self.shared.emit(StreamEvent::Connected);
        }
    }

    fn on_end(&mut self) {
        self.close();
    }
}

/// Sends items to a device and publishes the items it receives.
///
/// Dropping the stream stops the worker and closes the device.
pub struct Stream<C: StreamCodec> {
    shared: Arc<Shared<C>>,
    service: Service,
}

impl<C: StreamCodec> Stream<C> {
    /// Start a stream on `device`. The device is opened by the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread can't be spawned.
    pub fn start(device: Device, codec: C, config: &StreamConfig) -> Result<Self> {
        let (events, _) = broadcast::channel(config.channel_capacity.max(1));
        let shared = Arc::new(Shared {
            device: Mutex::new(Arc::new(device)),
            codec: Arc::new(codec),
            events,
            reconnect_period: config.reconnect_period(),
        });
        let worker = StreamWorker {
            shared: Arc::clone(&shared),
        };
        let service = Service::spawn(worker, config.task_delay())?;
        info!(port = %shared.device().port(), "Stream started");
        Ok(Self { shared, service })
    }

    /// Receive stream events from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent<C::Item>> {
        self.shared.events.subscribe()
    }

    /// The codec in use.
    #[must_use]
    pub fn codec(&self) -> &C {
        &self.shared.codec
    }

    /// The current device.
    #[must_use]
    pub fn device(&self) -> Arc<Device> {
        self.shared.device()
    }

    /// Replace the device. The stream is paused around the swap.
    pub fn set_device(&self, device: Device) {
        let resume = self.service.is_running();
        self.service.pause();
        *self
            .shared
            .device
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(device);
        if resume {
            self.service.resume();
        }
    }

    /// Encode and write `item`. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] while paused or stopped, or the device
    /// error if the write fails.
    pub fn send(&self, item: &C::Item) -> Result<usize> {
        if !self.service.is_running() {
            return Err(Error::NotRunning {
                name: STREAM_NAME.to_string(),
            });
        }
        let device = self.shared.device();
        debug!(port = %device.port(), item = ?item, "Sending");
        device.write(&self.shared.codec.encode(item))
    }

    /// True while the device is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.device().is_open()
    }

    /// Worker state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        self.service.state()
    }

    /// True while running and not paused.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.service.is_running()
    }

    /// True until stopped.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.service.is_alive()
    }

    /// Pause the worker and close the device.
    pub fn pause(&self) {
        self.service.pause();
    }

    /// Reopen the device and resume the worker.
    pub fn resume(&self) {
        self.service.resume();
    }

    /// Ask the worker to stop. See [`Stream::join`].
    pub fn stop(&self) {
        self.service.stop();
    }

    /// Wait for the worker to end.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker panicked.
    pub fn join(&mut self) -> Result<()> {
        self.service.join()
    }
}

impl<C: StreamCodec> std::fmt::Debug for Stream<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("device", &self.shared.device())
            .field("state", &self.service.state())
            .finish_non_exhaustive()
    }
}
