//! Periodic datagram loop with statum state machine
//!
//! # State Machine
//!
//! ```text
//! Idle ──open──► Sending ──cancel──► Idle
//! ```
//!
//! Each tick reads one snapshot of the control state, renders the wire line
//! and makes exactly one send attempt. A failed send is counted and logged;
//! the next tick proceeds as usual.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, TimeDelta};
use statum::{machine, state};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SenderError;
use crate::config::TargetEndpoint;
use crate::control::ControlState;

/// Counters shared between the send loop and status readers.
#[derive(Debug, Default)]
pub struct SenderStats {
    packets_sent: AtomicU64,
    send_errors: AtomicU64,
    active_loops: AtomicUsize,
    last_sent_ms: AtomicI64,
}

impl SenderStats {
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors.load(Ordering::Relaxed)
    }

    /// Number of send loops currently running against these counters.
    pub fn active_loops(&self) -> usize {
        self.active_loops.load(Ordering::Relaxed)
    }

    pub fn last_sent(&self) -> Option<DateTime<Local>> {
        match self.last_sent_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms).map(|t| t.with_timezone(&Local)),
        }
    }

    fn record_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.last_sent_ms
            .store(Local::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum SenderState {
    Idle,
    Sending,
}

#[machine]
pub struct DatagramLoop<S: SenderState> {
    control: Arc<ControlState>,
    stats: Arc<SenderStats>,
    endpoint: TargetEndpoint,
    socket: Option<UdpSocket>,
    target: Option<SocketAddr>,
}

impl<S: SenderState> DatagramLoop<S> {
    pub fn endpoint(&self) -> &TargetEndpoint {
        &self.endpoint
    }
}

impl DatagramLoop<Idle> {
    pub fn create(
        control: Arc<ControlState>,
        stats: Arc<SenderStats>,
        endpoint: TargetEndpoint,
    ) -> Self {
        Self::new(control, stats, endpoint, None, None)
    }

    /// Resolves the target and opens the send socket.
    pub async fn open(mut self) -> Result<DatagramLoop<Sending>, SenderError> {
        let target = resolve_target(&self.endpoint.host, self.endpoint.port).await?;
        let socket = bind_for(target).await?;
        debug!("Send socket bound for target {}", target);
        self.socket = Some(socket);
        self.target = Some(target);
        Ok(self.transition())
    }
}

impl DatagramLoop<Sending> {
    pub fn target(&self) -> Result<SocketAddr, SenderError> {
        self.target.ok_or(SenderError::NotOpen)
    }

    /// Serializes the current state and sends it once.
    pub async fn send_tick(&self) -> Result<usize, SenderError> {
        let (Some(socket), Some(target)) = (&self.socket, self.target) else {
            return Err(SenderError::NotOpen);
        };
        let payload = self.control.serialize();
        socket
            .send_to(payload.as_bytes(), target)
            .await
            .map_err(|source| SenderError::Send { target, source })
    }

    /// Ticks on an absolute schedule until `token` is cancelled, then closes
    /// the socket.
    pub async fn run_until_cancelled(mut self, token: CancellationToken) -> DatagramLoop<Idle> {
        let mut ticker = tokio::time::interval(self.endpoint.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.stats.active_loops.fetch_add(1, Ordering::Relaxed);
        info!(
            "Sending to {} every {:?}",
            self.endpoint,
            self.endpoint.interval()
        );

        let mut sent_since_log = 0u64;
        let mut errors_since_log = 0u64;
        let mut last_log_time = Local::now();
        let log_interval = TimeDelta::seconds(10);

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,

                _ = ticker.tick() => {
                    match self.send_tick().await {
                        Ok(_) => {
                            self.stats.record_sent();
                            sent_since_log += 1;
                        }
                        Err(e) => {
                            self.stats.record_error();
                            errors_since_log += 1;
                            warn!("{}", e);
                        }
                    }

                    let now = Local::now();
                    if now - last_log_time > log_interval {
                        debug!(
                            "Sender stats: {} packets, {} errors in last {} seconds",
                            sent_since_log,
                            errors_since_log,
                            log_interval.num_seconds()
                        );
                        sent_since_log = 0;
                        errors_since_log = 0;
                        last_log_time = now;
                    }
                }
            }
        }

        self.socket = None;
        self.target = None;
        self.stats.active_loops.fetch_sub(1, Ordering::Relaxed);
        info!("Stopped sending to {}", self.endpoint);
        self.transition()
    }
}

/// Resolves `host:port`, taking the first address returned.
pub async fn resolve_target(host: &str, port: u16) -> Result<SocketAddr, SenderError> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| SenderError::Resolve {
            host: host.to_string(),
            source,
        })?;
    addrs.next().ok_or_else(|| SenderError::NoAddress {
        host: host.to_string(),
    })
}

/// Binds an ephemeral local port of the same address family as `target`.
pub async fn bind_for(target: SocketAddr) -> Result<UdpSocket, SenderError> {
    let local = match target {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };
    UdpSocket::bind(local).await.map_err(SenderError::Bind)
}

/// Sends one datagram on its own short-lived socket, outside the periodic
/// cadence. Failures are logged, never returned.
pub fn send_once(message: String, host: String, port: u16) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result: Result<usize, SenderError> = async {
            let target = resolve_target(&host, port).await?;
            let socket = bind_for(target).await?;
            socket
                .send_to(message.as_bytes(), target)
                .await
                .map_err(|source| SenderError::Send { target, source })
        }
        .await;

        match result {
            Ok(len) => debug!("Sent {} byte message to {}:{}", len, host, port),
            Err(e) => warn!("Single send failed: {}", e),
        }
    })
}
