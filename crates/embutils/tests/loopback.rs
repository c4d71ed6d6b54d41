//! Frames sent through loopback devices, end to end.

use std::time::Duration;

use embutils::serial::SerialSettings;
use embutils::{CobsCodec, Config, Device, Interface, SimpleFrame, Stream, StreamEvent};

fn config() -> Config {
    let mut config = Config::default();
    config.serial.timeout_ms = 10;
    config.stream.reconnect_period_ms = 10;
    config
}

#[tokio::test]
async fn test_stream_delivers_frames_in_order() {
    let config = config();
    let device = Device::loopback(config.serial_settings().unwrap());
    let mut stream = Stream::start(device, CobsCodec::<SimpleFrame>::new(), &config.stream).unwrap();
    let mut events = stream.subscribe();

    let frames: Vec<SimpleFrame> = (0u8..5)
        .map(|n| SimpleFrame::new(n, 0x10, vec![n; usize::from(n) * 3]).unwrap())
        .collect();

    tokio::time::timeout(Duration::from_secs(2), async {
        while !stream.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    for frame in &frames {
        stream.send(frame).unwrap();
    }

    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), async {
        while received.len() < frames.len() {
            if let StreamEvent::Received(frame) = events.recv().await.unwrap() {
                received.push(frame);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(received, frames);

    stream.stop();
    stream.join().unwrap();
}

#[tokio::test]
async fn test_interface_request_on_loopback() {
    let interface = Interface::loopback(CobsCodec::<SimpleFrame>::new(), &config()).unwrap();
    assert!(interface.wait_connected(Duration::from_secs(2)).await);

    // Payloads with zero bytes survive the COBS framing.
    let request = SimpleFrame::new(0x01, 0x7E, vec![0x00, 0x11, 0x00, 0x00, 0xFF]).unwrap();
    let response = interface
        .request(&request, |frame: &SimpleFrame| frame.destination() == 0x7E, None)
        .await
        .unwrap();
    assert_eq!(response, request);
    assert_eq!(response.payload(), &[0x00, 0x11, 0x00, 0x00, 0xFF]);
}

#[tokio::test]
async fn test_interface_survives_device_loss() {
    let interface = Interface::loopback(CobsCodec::<SimpleFrame>::new(), &config()).unwrap();
    assert!(interface.wait_connected(Duration::from_secs(2)).await);
    let mut events = interface.subscribe();

    interface.stream().device().close().unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if events.recv().await.unwrap() == StreamEvent::Reconnected {
                break;
            }
        }
    })
    .await
    .unwrap();

    let frame = SimpleFrame::new(0x02, 0x03, b"again".to_vec()).unwrap();
    let response = interface
        .transmit(&frame, Some(|item: &SimpleFrame| item.payload() == b"again"), None)
        .await
        .unwrap();
    assert_eq!(response, Some(frame));
}

#[test]
fn test_loopback_settings_come_from_config() {
    let mut config = config();
    config.interface.baud_rate = 921_600;
    let settings: SerialSettings = config.interface_settings().unwrap();
    assert_eq!(settings.baud_rate, 921_600);
    assert_eq!(settings.timeout, Duration::from_millis(10));
}
