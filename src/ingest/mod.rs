//! TCP ingest of textual input-event dumps
//!
//! Producers connect to the ingest port (19999 by default) and stream lines
//! such as `EV_ABS ABS_X fffff969`, typically piped from an event capture
//! tool running next to the device:
//!
//! ```text
//! getevent -l /dev/input/event4 | nc <bridge-host> 19999
//! ```
//!
//! Any number of producers may be connected at once; a stalled connection
//! only suspends its own handler.

pub mod ingest_handle;
pub mod ingest_server;

pub use ingest_handle::{IngestHandle, IngestReport};
pub use ingest_server::{IngestServer, IngestStats};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to bind ingest port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),

    #[error("Ingest server is not listening")]
    NotListening,
}
