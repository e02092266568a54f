//! Remote port forwarding (`tcpip-forward` / `forwarded-tcpip`).
//!
//! The server listens on our behalf; inbound connections arrive as
//! `forwarded-tcpip` channel opens, which are relayed to a local target.

use super::types::ForwardAddr;
use super::{log_accept_error, relay};
use crate::ssh::session::Session;
use hawser_platform::HawserResult;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// A running remote forward.
#[derive(Debug)]
pub struct RemoteForward {
    /// Address the server listens on.
    remote_addr: ForwardAddr,
    /// Local target each forwarded connection is relayed to.
    target: ForwardAddr,
}

impl RemoteForward {
    /// Requests the server-side listener.
    ///
    /// `remote_port` 0 lets the server choose; the bound port is available
    /// via [`remote_addr`](Self::remote_addr).
    pub async fn request(
        session: &Session,
        remote_address: &str,
        remote_port: u16,
        target: &str,
    ) -> HawserResult<Self> {
        let target = ForwardAddr::parse(target)?;
        let bound_port = session
            .tcpip_forward(remote_address, u32::from(remote_port))
            .await?;
        Ok(Self {
            remote_addr: ForwardAddr::new(remote_address, bound_port as u16),
            target,
        })
    }

    /// The server-side listening address.
    pub fn remote_addr(&self) -> &ForwardAddr {
        &self.remote_addr
    }

    /// Services forwarded channels until the session closes.
    ///
    /// Takes the session's forwarded-channel stream; only one remote
    /// forward can run per session at a time.
    pub async fn run(self, session: Arc<Session>) -> HawserResult<()> {
        let mut incoming = session.incoming_forwarded()?;
        info!(remote = %self.remote_addr, target = %self.target, "remote forward active");

        while let Some(forwarded) = incoming.recv().await {
            debug!(
                originator = %forwarded.originator_address,
                port = forwarded.originator_port,
                "forwarded connection"
            );
            let target = self.target.clone();
            tokio::spawn(async move {
                match TcpStream::connect((target.host.as_str(), target.port)).await {
                    Ok(socket) => relay(socket, forwarded.channel).await,
                    Err(err) => {
                        log_accept_error("remote forward", &err.into());
                        let _ = forwarded.channel.close().await;
                    }
                }
            });
        }
        Ok(())
    }
}
