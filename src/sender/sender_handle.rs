//! Sender Handle - lifecycle management for the periodic datagram loop

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::datagram_sender::{DatagramLoop, SenderStats};
use super::SenderError;
use crate::config::TargetEndpoint;
use crate::control::ControlState;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SenderStatus {
    pub running: bool,
    pub target: Option<TargetEndpoint>,
    pub packets_sent: u64,
    pub send_errors: u64,
    pub last_sent: Option<DateTime<Local>>,
}

struct RunningLoop {
    endpoint: TargetEndpoint,
    target: SocketAddr,
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns at most one running send loop.
pub struct SenderHandle {
    control: Arc<ControlState>,
    stats: Arc<SenderStats>,
    running: Option<RunningLoop>,
}

impl SenderHandle {
    pub fn new(control: Arc<ControlState>) -> Self {
        Self {
            control,
            stats: Arc::new(SenderStats::default()),
            running: None,
        }
    }

    /// Opens the socket and spawns the send loop.
    ///
    /// Does nothing while a loop is already running, even when `endpoint`
    /// differs; stop first to retarget.
    pub async fn start(&mut self, endpoint: TargetEndpoint) -> Result<(), SenderError> {
        if let Some(running) = &self.running {
            debug!(
                "Already sending to {}, ignoring start for {}",
                running.endpoint, endpoint
            );
            return Ok(());
        }

        let sending = DatagramLoop::create(self.control.clone(), self.stats.clone(), endpoint.clone())
            .open()
            .await?;
        let target = sending.target()?;

        let token = CancellationToken::new();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let _idle = sending.run_until_cancelled(task_token).await;
        });

        info!("Sender started for {} ({})", endpoint, target);
        self.running = Some(RunningLoop {
            endpoint,
            target,
            token,
            task,
        });
        Ok(())
    }

    /// Ends the loop after its current tick and closes the socket.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            debug!("Sender not running");
            return;
        };
        running.token.cancel();
        if let Err(e) = running.task.await {
            error!("Sender task panicked: {}", e);
        }
    }

    pub fn is_sending(&self) -> bool {
        self.running.is_some()
    }

    /// Resolved address of the running loop.
    pub fn target(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.target)
    }

    pub fn stats(&self) -> Arc<SenderStats> {
        self.stats.clone()
    }

    pub fn status(&self) -> SenderStatus {
        SenderStatus {
            running: self.is_sending(),
            target: self.running.as_ref().map(|running| running.endpoint.clone()),
            packets_sent: self.stats.packets_sent(),
            send_errors: self.stats.send_errors(),
            last_sent: self.stats.last_sent(),
        }
    }
}

impl Drop for SenderHandle {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlButton, ControlField};
    use crate::sender::send_once;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    async fn receiver() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    async fn recv_text(socket: &UdpSocket) -> String {
        let mut buf = [0u8; 256];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("no datagram received")
            .unwrap();
        String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn transmits_the_serialized_state() {
        let control = Arc::new(ControlState::default());
        control.set(ControlField::LeftStickH, -200);
        control.set(ControlField::RightDial, 40);
        control.set_button(ControlButton::C2, true);

        let (socket, port) = receiver().await;
        let mut sender = SenderHandle::new(control.clone());
        sender
            .start(TargetEndpoint::new("127.0.0.1", port, 10))
            .await
            .unwrap();

        assert_eq!(recv_text(&socket).await, "-200,0,0,0,127,40,0,1,0,0");

        control.set(ControlField::LeftStickH, 55);
        let mut latest = recv_text(&socket).await;
        for _ in 0..5 {
            if latest.starts_with("55,") {
                break;
            }
            latest = recv_text(&socket).await;
        }
        assert_eq!(latest, "55,0,0,0,127,40,0,1,0,0");

        sender.stop().await;
        assert!(!sender.status().running);
        assert!(sender.status().packets_sent >= 2);
        assert!(sender.status().last_sent.is_some());
    }

    #[tokio::test]
    async fn second_start_keeps_a_single_loop() {
        let control = Arc::new(ControlState::default());
        let (_socket, port) = receiver().await;
        let (_other, other_port) = receiver().await;
        let mut sender = SenderHandle::new(control);

        sender
            .start(TargetEndpoint::new("127.0.0.1", port, 20))
            .await
            .unwrap();
        sender
            .start(TargetEndpoint::new("127.0.0.1", other_port, 20))
            .await
            .unwrap();

        let stats = sender.stats();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(stats.active_loops(), 1);
        assert_eq!(sender.target().map(|t| t.port()), Some(port));
        // One loop at 50 Hz over 200 ms, with generous slack for scheduling.
        assert!(stats.packets_sent() <= 15, "sent {}", stats.packets_sent());

        sender.stop().await;
        assert_eq!(stats.active_loops(), 0);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_safe_before_start() {
        let control = Arc::new(ControlState::default());
        let mut sender = SenderHandle::new(control);
        sender.stop().await;

        let (_socket, port) = receiver().await;
        sender
            .start(TargetEndpoint::new("127.0.0.1", port, 5))
            .await
            .unwrap();
        sender.stop().await;
        sender.stop().await;

        let sent = sender.stats().packets_sent();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sender.stats().packets_sent(), sent);
    }

    #[tokio::test]
    async fn failed_sends_do_not_end_the_loop() {
        let control = Arc::new(ControlState::default());
        let mut sender = SenderHandle::new(control);
        // Broadcast without SO_BROADCAST is rejected on every tick.
        sender
            .start(TargetEndpoint::new("255.255.255.255", 9, 5))
            .await
            .unwrap();

        let stats = sender.stats();
        tokio::time::timeout(Duration::from_secs(2), async {
            while stats.send_errors() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("loop stopped ticking");
        assert!(sender.is_sending());
        assert_eq!(stats.active_loops(), 1);
        sender.stop().await;
    }

    #[tokio::test]
    async fn send_once_delivers_a_single_message() {
        let (socket, port) = receiver().await;
        send_once("C1_PRESSED".to_string(), "127.0.0.1".to_string(), port)
            .await
            .unwrap();
        assert_eq!(recv_text(&socket).await, "C1_PRESSED");
    }

    #[tokio::test]
    async fn send_once_swallows_failures() {
        let handle = send_once("x".to_string(), "255.255.255.255".to_string(), 9);
        assert!(handle.await.is_ok());
    }
}
