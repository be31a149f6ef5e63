//! Best-effort datagram side channel.
//!
//! Exists for supplementary low-value telemetry where loss is acceptable.
//! Failures are swallowed; sends never block the caller beyond a local
//! socket write.

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::emit;
use crate::metrics::events::SideChannelDropped;

/// Fire-and-forget UDP sender.
pub struct SideChannel {
    socket: UdpSocket,
    target: String,
}

impl SideChannel {
    /// Bind a local socket for the given target address.
    ///
    /// Returns `None` (with a warning) if the local bind fails; the side
    /// channel is then disabled rather than failing startup.
    pub async fn bind(target: String) -> Option<Self> {
        match UdpSocket::bind("0.0.0.0:0").await {
            Ok(socket) => Some(Self { socket, target }),
            Err(e) => {
                warn!(error = %e, "Side channel socket bind failed, disabling");
                None
            }
        }
    }

    /// Send one formatted line. Loss is expected and only counted.
    pub async fn send(&self, line: &str) {
        if let Err(e) = self.socket.send_to(line.as_bytes(), &self.target).await {
            debug!(target = %self.target, error = %e, "Side channel send failed");
            emit!(SideChannelDropped);
        }
    }
}
