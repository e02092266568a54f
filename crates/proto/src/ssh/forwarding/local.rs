//! Local port forwarding (`direct-tcpip`).
//!
//! Listens on a local address; every accepted connection is tunneled
//! through a fresh `direct-tcpip` channel to the configured target, with
//! bytes relayed in both directions until either side closes.

use super::types::ForwardAddr;
use super::{log_accept_error, relay};
use crate::ssh::session::Session;
use hawser_platform::HawserResult;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// A running local forward.
#[derive(Debug)]
pub struct LocalForward {
    listener: TcpListener,
    local_addr: ForwardAddr,
    target: ForwardAddr,
}

impl LocalForward {
    /// Binds the local listener.
    ///
    /// `local` is the address to listen on (e.g. `"127.0.0.1:8080"`),
    /// `target` the destination reached through the server.
    pub async fn bind(local: &str, target: &str) -> HawserResult<Self> {
        let target = ForwardAddr::parse(target)?;
        let listener = TcpListener::bind(local).await?;
        let bound = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr: ForwardAddr::new(&bound.ip().to_string(), bound.port()),
            target,
        })
    }

    /// The actually bound local address (resolves port 0).
    pub fn local_addr(&self) -> &ForwardAddr {
        &self.local_addr
    }

    /// The target address on the far side.
    pub fn target_addr(&self) -> &ForwardAddr {
        &self.target
    }

    /// Accepts connections until an accept error or cancellation.
    ///
    /// Each connection gets its own channel and relay task; a failed
    /// channel open drops that one connection, not the forward.
    pub async fn run(self, session: Arc<Session>) -> HawserResult<()> {
        info!(local = %self.local_addr, target = %self.target, "local forward listening");

        loop {
            let (socket, peer) = self.listener.accept().await?;
            debug!(peer = %peer, "local forward connection accepted");

            let open = session
                .open_direct_tcpip(
                    &self.target.host,
                    u32::from(self.target.port),
                    &peer.ip().to_string(),
                    u32::from(peer.port()),
                )
                .await;

            match open {
                Ok(channel) => {
                    tokio::spawn(relay(socket, channel));
                }
                Err(err) => log_accept_error("local forward", &err),
            }
        }
    }
}
