//! Request/response command interface on top of a [`Stream`].

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use super::device::Device;
use super::stream::{Stream, StreamEvent};
use crate::codec::StreamCodec;
use crate::config::Config;
use crate::error::{Error, Result};

const CONNECT_POLL: Duration = Duration::from_millis(10);

/// Sends items and waits for matching responses.
///
/// Device-specific commands are built on [`Interface::transmit`]: send a
/// request, then wait for the first received item the matcher accepts.
#[derive(Debug)]
pub struct Interface<C: StreamCodec> {
    stream: Stream<C>,
    timeout: Duration,
}

impl<C: StreamCodec> Interface<C> {
    /// Start an interface on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream worker can't be started.
    pub fn new(codec: C, device: Device, config: &Config) -> Result<Self> {
        Ok(Self {
            stream: Stream::start(device, codec, &config.stream)?,
            timeout: config.interface.response_timeout(),
        })
    }

    /// Start an interface on a loopback device, which answers every request
    /// with the request itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the serial settings are invalid or the stream
    /// worker can't be started.
    pub fn loopback(codec: C, config: &Config) -> Result<Self> {
        let device = Device::loopback(config.interface_settings()?);
        Self::new(codec, device, config)
    }

    /// Default response timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the default response timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if `timeout` is zero.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::invalid_value(
                format!("{timeout:?}"),
                "response timeout must be greater than zero",
            ));
        }
        self.timeout = timeout;
        Ok(())
    }

    /// The underlying stream.
    #[must_use]
    pub fn stream(&self) -> &Stream<C> {
        &self.stream
    }

    /// Receive stream events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent<C::Item>> {
        self.stream.subscribe()
    }

    /// True while the device is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_connected()
    }

    /// Send `item` without waiting for a response.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is not running or the write fails.
    pub fn send(&self, item: &C::Item) -> Result<usize> {
        self.stream.send(item)
    }

    /// Send `item` and, with a matcher, wait for the first received item it
    /// accepts.
    ///
    /// Returns `Ok(None)` without a matcher or when no response arrived
    /// within `wait` (the default timeout when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the item can't be sent.
    pub async fn transmit<F>(
        &self,
        item: &C::Item,
        matcher: Option<F>,
        wait: Option<Duration>,
    ) -> Result<Option<C::Item>>
    where
        F: Fn(&C::Item) -> bool,
    {
        let Some(matcher) = matcher else {
            self.stream.send(item)?;
            return Ok(None);
        };

        // Subscribe first so a fast response is not missed.
        let mut events = self.stream.subscribe();
        self.stream.send(item)?;

        let wait = wait.unwrap_or(self.timeout);
        let response = timeout(wait, async {
            loop {
                match events.recv().await {
                    Ok(StreamEvent::Received(response)) if matcher(&response) => {
                        return Some(response);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Response listener lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .await
        .ok()
        .flatten();

        if response.is_none() {
            debug!(item = ?item, timeout_ms = wait.as_millis(), "No response received");
        }
        Ok(response)
    }

    /// Like [`Interface::transmit`], but a missing response is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no matching response arrived, or an
    /// error if the item can't be sent.
    pub async fn request<F>(&self, item: &C::Item, matcher: F, wait: Option<Duration>) -> Result<C::Item>
    where
        F: Fn(&C::Item) -> bool,
    {
        self.transmit(item, Some(matcher), wait)
            .await?
            .ok_or_else(|| Error::Timeout {
                operation: format!("response on {}", self.stream.device().port()),
            })
    }

    /// Wait until the device is open. Returns false on timeout.
    pub async fn wait_connected(&self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        while !self.stream.is_connected() {
            if Instant::now() >= deadline {
                return false;
            }
            sleep(CONNECT_POLL).await;
        }
        true
    }

    /// Ask the stream worker to stop.
    pub fn stop(&self) {
        self.stream.stop();
    }

    /// Wait for the stream worker to end.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker panicked.
    pub fn join(&mut self) -> Result<()> {
        self.stream.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CobsCodec;
    use crate::frame::SimpleFrame;

    type FrameInterface = Interface<CobsCodec<SimpleFrame>>;

    fn config() -> Config {
        let mut config = Config::default();
        config.serial.timeout_ms = 10;
        config.stream.reconnect_period_ms = 10;
        config
    }

    async fn connected() -> FrameInterface {
        let interface = Interface::loopback(CobsCodec::new(), &config()).unwrap();
        assert!(interface.wait_connected(Duration::from_secs(2)).await);
        interface
    }

    #[tokio::test]
    async fn test_transmit_returns_echo() {
        let interface = connected().await;
        let frame = SimpleFrame::new(0x01, 0x02, b"ping".to_vec()).unwrap();

        let response = interface
            .transmit(&frame, Some(|item: &SimpleFrame| item.payload() == b"ping"), None)
            .await
            .unwrap();
        assert_eq!(response, Some(frame));
    }

    #[tokio::test]
    async fn test_transmit_times_out() {
        let interface = connected().await;
        let frame = SimpleFrame::new(0x01, 0x02, b"ping".to_vec()).unwrap();

        let start = Instant::now();
        let response = interface
            .transmit(
                &frame,
                Some(|item: &SimpleFrame| item.source() == 0x7F),
                Some(Duration::from_millis(50)),
            )
            .await
            .unwrap();
        assert_eq!(response, None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_transmit_without_matcher() {
        let interface = connected().await;
        let frame = SimpleFrame::new(0, 1, Vec::new()).unwrap();
        let response = interface
            .transmit(&frame, None::<fn(&SimpleFrame) -> bool>, None)
            .await
            .unwrap();
        assert_eq!(response, None);
    }

    #[tokio::test]
    async fn test_request_timeout_error() {
        let interface = connected().await;
        let frame = SimpleFrame::new(0, 1, Vec::new()).unwrap();
        let err = interface
            .request(&frame, |_: &SimpleFrame| false, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_set_timeout() {
        let mut interface = connected().await;
        assert_eq!(interface.timeout(), Duration::from_millis(500));
        assert!(interface.set_timeout(Duration::ZERO).is_err());
        interface.set_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(interface.timeout(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_stop_and_join() {
        let mut interface = connected().await;
        interface.stop();
        interface.join().unwrap();
        assert!(!interface.is_connected());
        let frame = SimpleFrame::new(0, 1, Vec::new()).unwrap();
        assert!(interface.send(&frame).is_err());
    }
}
