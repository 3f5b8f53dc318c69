//! Periodic UDP transmission of the control state
//!
//! Wire format, one datagram per tick, UTF-8 without trailing newline:
//!
//! ```text
//! LSH,LSV,RSH,RSV,LD,RD,C1,C2,C3,GH
//! ```
//!
//! There is no acknowledgment; the receiver always acts on the newest
//! datagram.

pub mod datagram_sender;
pub mod sender_handle;

use std::net::SocketAddr;

pub use datagram_sender::{send_once, DatagramLoop, SenderStats};
pub use sender_handle::{SenderHandle, SenderStatus};

#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    #[error("Failed to resolve target host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Target host {host} resolved to no address")]
    NoAddress { host: String },

    #[error("Failed to open send socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("Failed to send datagram to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Send socket is not open")]
    NotOpen,
}
