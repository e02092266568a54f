//! Port forwarding over SSH channels (RFC 4254 Sections 7.1-7.2).
//!
//! - [`LocalForward`]: listen locally, tunnel each connection through a
//!   `direct-tcpip` channel.
//! - [`RemoteForward`]: ask the server to listen (`tcpip-forward` global
//!   request) and service the resulting `forwarded-tcpip` channels against
//!   a local target.

pub mod local;
pub mod remote;
pub mod types;

pub use local::LocalForward;
pub use remote::RemoteForward;
pub use types::ForwardAddr;

use crate::ssh::channel::{Channel, ChannelEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// One step of the relay loop, resolved before any channel call so the
/// select's borrows are released first.
enum RelayStep {
    SocketData(usize),
    SocketClosed,
    SocketError(std::io::Error),
    Channel(Option<ChannelEvent>),
}

/// Relays bytes between a TCP socket and an SSH channel until either side
/// finishes. Consumes both; closes the channel on the way out.
pub(crate) async fn relay(socket: TcpStream, mut channel: Channel) {
    let (mut sock_read, mut sock_write) = socket.into_split();
    let mut buf = vec![0u8; 32 * 1024];
    let mut socket_open = true;

    loop {
        let step = tokio::select! {
            read = sock_read.read(&mut buf), if socket_open => match read {
                Ok(0) => RelayStep::SocketClosed,
                Ok(n) => RelayStep::SocketData(n),
                Err(e) => RelayStep::SocketError(e),
            },
            event = channel.next_event() => RelayStep::Channel(event),
        };

        match step {
            RelayStep::SocketData(n) => {
                if let Err(e) = channel.send_data(&buf[..n]).await {
                    debug!(error = %e, "channel write failed");
                    break;
                }
            }
            RelayStep::SocketClosed => {
                socket_open = false;
                if let Err(e) = channel.send_eof().await {
                    debug!(error = %e, "EOF after socket close failed");
                    break;
                }
            }
            RelayStep::SocketError(e) => {
                debug!(error = %e, "socket read failed");
                break;
            }
            RelayStep::Channel(Some(ChannelEvent::Data(data))) => {
                if let Err(e) = sock_write.write_all(&data).await {
                    debug!(error = %e, "socket write failed");
                    break;
                }
            }
            RelayStep::Channel(Some(ChannelEvent::ExtendedData { data, .. })) => {
                // Forwarded connections have no stderr; pass it through.
                if sock_write.write_all(&data).await.is_err() {
                    break;
                }
            }
            RelayStep::Channel(Some(ChannelEvent::Eof)) => {
                let _ = sock_write.shutdown().await;
            }
            RelayStep::Channel(Some(ChannelEvent::Closed)) | RelayStep::Channel(None) => break,
            RelayStep::Channel(Some(_)) => {}
        }
    }

    if let Err(e) = channel.close().await {
        debug!(error = %e, "channel close after relay failed");
    }
}

pub(crate) fn log_accept_error(what: &str, err: &hawser_platform::HawserError) {
    warn!(error = %err, "{} connection could not be forwarded", what);
}
