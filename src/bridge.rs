//! Bridge - the surface a host application drives
//!
//! Wires one [`ControlState`] to the ingest server, the live event adapter
//! and the periodic sender, and turns their state into short status strings
//! for display.
//!
//! ```text
//! host UI ──► Bridge ──► IngestHandle ──┐
//!               │                       ├─► ControlState ──► SenderHandle ──► UDP
//!               └──► DirectEventAdapter ┘
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{BridgeConfig, TargetEndpoint};
use crate::control::{AxisReport, ControlButton, ControlOptions, ControlState};
use crate::controller::device::{DeviceLocator, GilrsLocator, NameMatcher};
use crate::controller::motion::{DirectEventAdapter, MotionEvent};
use crate::ingest::{IngestError, IngestHandle, IngestReport};
use crate::sender::{send_once, SenderError, SenderHandle, SenderStatus};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Sender error: {0}")]
    Sender(#[from] SenderError),
}

pub struct Bridge {
    control: Arc<ControlState>,
    ingest: IngestHandle,
    sender: SenderHandle,
    adapter: DirectEventAdapter,
    locator: Arc<dyn DeviceLocator>,
    endpoint: TargetEndpoint,
}

impl Bridge {
    /// Creates a bridge that discovers devices through gilrs.
    pub fn new(config: &BridgeConfig) -> Self {
        let matcher = NameMatcher::new(&config.ingest.device_name_patterns);
        Self::with_locator(config, Arc::new(GilrsLocator::new(matcher)))
    }

    pub fn with_locator(config: &BridgeConfig, locator: Arc<dyn DeviceLocator>) -> Self {
        let control = Arc::new(ControlState::new(ControlOptions {
            invert_vertical: config.axes.invert_vertical,
        }));
        Self {
            ingest: IngestHandle::new(control.clone()),
            sender: SenderHandle::new(control.clone()),
            adapter: DirectEventAdapter::new(control.clone()),
            control,
            locator,
            endpoint: config.target.clone(),
        }
    }

    /// Starts the ingest listener and enables the live event path.
    pub async fn start_ingest(&mut self, port: u16) -> Result<IngestReport, BridgeError> {
        let report = self.ingest.start(port, self.locator.clone()).await?;
        self.adapter.set_active(true);
        Ok(report)
    }

    pub async fn stop_ingest(&mut self) {
        self.adapter.set_active(false);
        self.ingest.stop().await;
    }

    /// Starts periodic transmission; a no-op while already sending.
    pub async fn start_send(&mut self, endpoint: TargetEndpoint) -> Result<(), BridgeError> {
        let was_sending = self.sender.is_sending();
        self.sender.start(endpoint.clone()).await?;
        if !was_sending {
            self.endpoint = endpoint;
        }
        Ok(())
    }

    pub async fn stop_send(&mut self) {
        self.sender.stop().await;
    }

    /// Sends one message to the current target outside the periodic cadence.
    pub fn send_once(&self, message: impl Into<String>) -> JoinHandle<()> {
        send_once(message.into(), self.endpoint.host.clone(), self.endpoint.port)
    }

    pub fn on_control_update<F>(&self, observer: F)
    where
        F: Fn(AxisReport) + Send + Sync + 'static,
    {
        self.control.on_update(observer);
    }

    /// Returns whether the event was handled.
    pub fn process_direct_axis_event(&self, event: &MotionEvent) -> bool {
        self.adapter.process(event)
    }

    pub fn set_buttons(&self, c1: bool, c2: bool, c3: bool, go_home: bool) {
        self.control.set_button(ControlButton::C1, c1);
        self.control.set_button(ControlButton::C2, c2);
        self.control.set_button(ControlButton::C3, c3);
        self.control.set_button(ControlButton::GoHome, go_home);
    }

    pub fn control_state(&self) -> Arc<ControlState> {
        self.control.clone()
    }

    pub fn direct_adapter(&self) -> DirectEventAdapter {
        self.adapter.clone()
    }

    pub fn endpoint(&self) -> &TargetEndpoint {
        &self.endpoint
    }

    pub fn ingest(&self) -> &IngestHandle {
        &self.ingest
    }

    pub fn sender_status(&self) -> SenderStatus {
        self.sender.status()
    }

    /// `"Sending to <host>:<port>"` or `"Stopped"`.
    pub fn status_line(&self) -> String {
        if self.sender.is_sending() {
            format!("Sending to {}", self.endpoint)
        } else {
            "Stopped".to_string()
        }
    }

    /// `"Joystick: <name>"`, or a hint to stream events over TCP.
    pub fn ingest_line(&self) -> String {
        match self.ingest.report() {
            Some(report) => format!("Joystick: {}", report.description()),
            None => "Joystick: not started".to_string(),
        }
    }

    pub async fn shutdown(&mut self) {
        info!("Shutting down bridge");
        self.stop_send().await;
        self.stop_ingest().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlField;
    use crate::controller::device::NoDeviceLocator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpStream, UdpSocket};

    fn bridge() -> Bridge {
        Bridge::with_locator(&BridgeConfig::default(), Arc::new(NoDeviceLocator))
    }

    #[tokio::test]
    async fn direct_events_need_a_started_bridge() {
        let mut bridge = bridge();
        let event = MotionEvent::joystick(1.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert!(!bridge.process_direct_axis_event(&event));

        bridge.start_ingest(0).await.unwrap();
        assert!(bridge.process_direct_axis_event(&event));
        assert_eq!(bridge.control_state().axes().left_stick_h, 660);

        bridge.stop_ingest().await;
        assert!(!bridge.process_direct_axis_event(&event));
    }

    #[tokio::test]
    async fn status_lines_follow_lifecycle() {
        let mut bridge = bridge();
        assert_eq!(bridge.status_line(), "Stopped");
        assert_eq!(bridge.ingest_line(), "Joystick: not started");

        let report = bridge.start_ingest(0).await.unwrap();
        assert_eq!(
            bridge.ingest_line(),
            format!(
                "Joystick: Not found (stream events to TCP port {})",
                report.local_addr.port()
            )
        );

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        bridge
            .start_send(TargetEndpoint::new("127.0.0.1", port, 20))
            .await
            .unwrap();
        assert_eq!(bridge.status_line(), format!("Sending to 127.0.0.1:{}", port));

        bridge.shutdown().await;
        assert_eq!(bridge.status_line(), "Stopped");
    }

    #[tokio::test]
    async fn ingested_lines_reach_the_wire() {
        let mut bridge = bridge();
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = updates.clone();
        bridge.on_control_update(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bridge.set_buttons(false, false, true, false);

        let report = bridge.start_ingest(0).await.unwrap();
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        bridge
            .start_send(TargetEndpoint::new("127.0.0.1", port, 10))
            .await
            .unwrap();

        let mut producer = TcpStream::connect(("127.0.0.1", report.local_addr.port()))
            .await
            .unwrap();
        producer
            .write_all(b"EV_ABS ABS_X 00007fff\nEV_ABS ABS_Y 00007fff\nEV_ABS ABS_RZ 000000ff\n")
            .await
            .unwrap();

        let expected = "660,-660,0,0,127,255,0,0,1,0";
        let received = tokio::time::timeout(Duration::from_secs(3), async {
            let mut buf = [0u8; 128];
            loop {
                let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
                if &buf[..len] == expected.as_bytes() {
                    break;
                }
            }
        })
        .await;
        assert!(received.is_ok(), "never saw {}", expected);
        tokio::time::timeout(Duration::from_secs(1), async {
            while updates.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("observer missed updates");
        assert_eq!(updates.load(Ordering::SeqCst), 3);

        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn stalled_producer_does_not_block_sending_or_other_producers() {
        let mut bridge = bridge();
        let report = bridge.start_ingest(0).await.unwrap();
        let ingest_addr = ("127.0.0.1", report.local_addr.port());

        let mut stalled = TcpStream::connect(ingest_addr).await.unwrap();
        stalled.write_all(b"EV_ABS ABS_X 0000").await.unwrap();

        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        bridge
            .start_send(TargetEndpoint::new("127.0.0.1", port, 10))
            .await
            .unwrap();

        let mut other = TcpStream::connect(ingest_addr).await.unwrap();
        other.write_all(b"EV_ABS ABS_RX 00007fff\n").await.unwrap();

        let mut received = 0;
        let mut buf = [0u8; 128];
        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        while let Ok(Ok(_)) =
            tokio::time::timeout_at(deadline, receiver.recv_from(&mut buf)).await
        {
            received += 1;
        }
        assert!(received >= 30, "only {} datagrams while a producer stalled", received);

        let control = bridge.control_state();
        tokio::time::timeout(Duration::from_secs(1), async {
            while control.get(ControlField::RightStickH) != 660 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("second producer was starved");
        assert_eq!(control.get(ControlField::LeftStickH), 0);
        assert_eq!(bridge.ingest().stats().active_connections(), 2);

        drop(stalled);
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn failed_start_keeps_the_previous_endpoint() {
        let mut bridge = bridge();
        let before = bridge.endpoint().clone();

        let rejected = bridge
            .start_send(TargetEndpoint::new("bad\0host", 9, 20))
            .await;
        assert!(matches!(rejected, Err(BridgeError::Sender(_))));
        assert_eq!(bridge.endpoint(), &before);
        assert_eq!(bridge.status_line(), "Stopped");
    }

    #[tokio::test]
    async fn send_once_uses_the_current_endpoint() {
        let mut bridge = bridge();
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        bridge
            .start_send(TargetEndpoint::new("127.0.0.1", port, 1000))
            .await
            .unwrap();

        bridge.send_once("GO_HOME").await.unwrap();
        let mut buf = [0u8; 128];
        let mut messages = Vec::new();
        for _ in 0..2 {
            let (len, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            messages.push(String::from_utf8_lossy(&buf[..len]).to_string());
        }
        assert!(messages.iter().any(|m| m == "GO_HOME"));
        bridge.shutdown().await;
    }
}
