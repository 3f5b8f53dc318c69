//! Line ingest server with statum state machine
//!
//! # State Machine
//!
//! ```text
//! Stopped ──bind──► Listening ──cancel──► Stopped
//! ```
//!
//! The accept loop and every connection handler are tokio tasks. Cancelling
//! the token ends the accept loop, drops the listening socket and ends all
//! handlers at their next suspension point.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use statum::{machine, state};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::IngestError;
use crate::control::{AxisUpdate, ControlState};
use crate::controller::event_line::parse_line;

/// Pause after a failed accept so a persistent error does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Longest accepted event line in bytes, newline included.
pub const MAX_LINE_BYTES: usize = 4096;

/// Counters shared by the accept loop and its connection handlers.
#[derive(Debug, Default)]
pub struct IngestStats {
    active_connections: AtomicUsize,
    connections_total: AtomicU64,
    lines_accepted: AtomicU64,
    lines_ignored: AtomicU64,
}

impl IngestStats {
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn connections_total(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    pub fn lines_accepted(&self) -> u64 {
        self.lines_accepted.load(Ordering::Relaxed)
    }

    pub fn lines_ignored(&self) -> u64 {
        self.lines_ignored.load(Ordering::Relaxed)
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum IngestState {
    Stopped,
    Listening,
}

#[machine]
pub struct IngestServer<S: IngestState> {
    control: Arc<ControlState>,
    stats: Arc<IngestStats>,
    listener: Option<TcpListener>,
}

impl<S: IngestState> IngestServer<S> {
    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }
}

impl IngestServer<Stopped> {
    pub fn create(control: Arc<ControlState>, stats: Arc<IngestStats>) -> Self {
        Self::new(control, stats, None)
    }

    /// Binds the listening socket on all IPv4 interfaces.
    pub async fn bind(mut self, port: u16) -> Result<IngestServer<Listening>, IngestError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|source| IngestError::Bind { port, source })?;
        self.listener = Some(listener);
        Ok(self.transition())
    }
}

impl IngestServer<Listening> {
    pub fn local_addr(&self) -> Result<SocketAddr, IngestError> {
        let listener = self.listener.as_ref().ok_or(IngestError::NotListening)?;
        listener.local_addr().map_err(IngestError::LocalAddr)
    }

    /// Accepts connections until `token` is cancelled.
    ///
    /// Returns once the listening socket is closed and every connection
    /// handler has finished.
    pub async fn run_until_cancelled(mut self, token: CancellationToken) -> IngestServer<Stopped> {
        let Some(listener) = self.listener.take() else {
            return self.transition();
        };
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Accept loop cancelled");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            self.control.clone(),
                            self.stats.clone(),
                            token.child_token(),
                        ));
                    }
                    Err(e) => {
                        if token.is_cancelled() {
                            break;
                        }
                        warn!("Error accepting client: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },

                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!("Connection handler failed: {}", e);
                    }
                }
            }
        }

        drop(listener);
        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                warn!("Connection handler failed during shutdown: {}", e);
            }
        }
        info!("Ingest listener closed");
        self.transition()
    }
}

/// Reads newline-delimited events until end of stream or cancellation.
///
/// Invalid UTF-8 is replaced rather than treated as an error so that one
/// garbled line does not end the connection. A line longer than
/// [`MAX_LINE_BYTES`] counts as one ignored line and its remainder is
/// discarded up to the next newline.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    control: Arc<ControlState>,
    stats: Arc<IngestStats>,
    token: CancellationToken,
) {
    info!("Client connected from {}", peer);
    stats.connections_total.fetch_add(1, Ordering::Relaxed);
    stats.active_connections.fetch_add(1, Ordering::Relaxed);

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(128);
    let mut discarding = false;

    loop {
        buf.clear();
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Closing connection from {} on shutdown", peer);
                break;
            }

            read = read_line_limited(&mut reader, &mut buf) => match read {
                Ok(0) => break,
                Ok(_) => {
                    let complete = buf.ends_with(b"\n");
                    if discarding {
                        discarding = !complete;
                        continue;
                    }
                    if !complete && buf.len() >= MAX_LINE_BYTES {
                        debug!("Dropping overlong line from {}", peer);
                        stats.lines_ignored.fetch_add(1, Ordering::Relaxed);
                        discarding = true;
                        continue;
                    }

                    let line = String::from_utf8_lossy(&buf);
                    match parse_line(&line) {
                        Some(sample) => {
                            control.apply(AxisUpdate::from_sample(sample));
                            stats.lines_accepted.fetch_add(1, Ordering::Relaxed);
                        }
                        None => {
                            stats.lines_ignored.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                Err(e) => {
                    if !token.is_cancelled() {
                        warn!("Client {} read error: {}", peer, e);
                    }
                    break;
                }
            }
        }
    }

    stats.active_connections.fetch_sub(1, Ordering::Relaxed);
    info!("Client {} disconnected", peer);
}

/// Reads up to and including the next newline, stopping early at
/// [`MAX_LINE_BYTES`].
async fn read_line_limited(
    reader: &mut BufReader<TcpStream>,
    buf: &mut Vec<u8>,
) -> std::io::Result<usize> {
    let mut limited = (&mut *reader).take(MAX_LINE_BYTES as u64);
    limited.read_until(b'\n', buf).await
}
