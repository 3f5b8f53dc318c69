//! Ingest Handle - lifecycle management for the line ingest server
//!
//! Owns the running accept loop, its cancellation token and task handle.
//! Start and stop are both idempotent.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::ingest_server::{IngestServer, IngestStats};
use super::IngestError;
use crate::control::ControlState;
use crate::controller::device::{DeviceInfo, DeviceLocator};

/// Result of starting the ingest side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub device: Option<DeviceInfo>,
    pub local_addr: SocketAddr,
}

impl IngestReport {
    pub fn device_found(&self) -> bool {
        self.device.is_some()
    }

    /// Device name, or a note on how to feed events without one.
    pub fn description(&self) -> String {
        match &self.device {
            Some(device) => device.name.clone(),
            None => format!(
                "Not found (stream events to TCP port {})",
                self.local_addr.port()
            ),
        }
    }
}

struct RunningIngest {
    report: IngestReport,
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct IngestHandle {
    control: Arc<ControlState>,
    stats: Arc<IngestStats>,
    running: Option<RunningIngest>,
}

impl IngestHandle {
    pub fn new(control: Arc<ControlState>) -> Self {
        Self {
            control,
            stats: Arc::new(IngestStats::default()),
            running: None,
        }
    }

    /// Looks for a device, binds `port` and starts accepting connections.
    ///
    /// A missing device does not prevent the listener from starting. When
    /// already listening the existing report is returned unchanged.
    pub async fn start(
        &mut self,
        port: u16,
        locator: Arc<dyn DeviceLocator>,
    ) -> Result<IngestReport, IngestError> {
        if let Some(running) = &self.running {
            debug!("Ingest already running on {}", running.report.local_addr);
            return Ok(running.report.clone());
        }

        let device = tokio::task::spawn_blocking(move || locator.locate())
            .await
            .unwrap_or_else(|e| {
                error!("Device discovery task failed: {}", e);
                None
            });

        let server = IngestServer::create(self.control.clone(), self.stats.clone())
            .bind(port)
            .await?;
        let local_addr = server.local_addr()?;
        info!("Ingest server listening on {}", local_addr);

        let token = CancellationToken::new();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let _stopped = server.run_until_cancelled(task_token).await;
        });

        let report = IngestReport { device, local_addr };
        self.running = Some(RunningIngest {
            report: report.clone(),
            token,
            task,
        });
        Ok(report)
    }

    /// Closes the listener and waits for every connection handler to end.
    ///
    /// The port can be bound again as soon as this returns.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            debug!("Ingest not running");
            return;
        };
        running.token.cancel();
        if let Err(e) = running.task.await {
            error!("Ingest task panicked: {}", e);
        }
        info!("Ingest server stopped");
    }

    pub fn is_listening(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    pub fn report(&self) -> Option<&IngestReport> {
        self.running.as_ref().map(|running| &running.report)
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }
}

impl Drop for IngestHandle {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.token.cancel();
        }
    }
}
