//! Keep-alive timer.
//!
//! Sends SSH_MSG_IGNORE with random payload at a configured interval to
//! defeat idle timeouts. Sends go through the session's try-send path: a
//! keep-alive never blocks behind a re-key and never fails the session;
//! misses are logged and the timer keeps running.

use crate::ssh::message::MessageType;
use crate::ssh::wire::WireWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::SessionShared;

/// Builds an SSH_MSG_IGNORE keep-alive message with `data_len` random
/// payload bytes.
pub fn create_keepalive_message(data_len: usize) -> Vec<u8> {
    use rand::RngCore;

    let mut data = vec![0u8; data_len];
    rand::thread_rng().fill_bytes(&mut data);

    let mut w = WireWriter::with_capacity(5 + data_len);
    w.put_byte(MessageType::Ignore as u8);
    w.put_string(&data);
    w.into_bytes()
}

/// Background keep-alive task handle. Stops when dropped.
pub(crate) struct KeepaliveTask {
    stop_signal: Arc<AtomicBool>,
    task_handle: Option<JoinHandle<()>>,
}

impl KeepaliveTask {
    /// Spawns the timer. The task holds only a weak reference to the
    /// session, so it winds down once the session is gone.
    pub(crate) fn spawn(interval: Duration, shared: std::sync::Weak<SessionShared>) -> Self {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_signal);

        let handle = tokio::spawn(async move {
            debug!(?interval, "keep-alive timer started");
            loop {
                tokio::time::sleep(interval).await;

                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let Some(session) = shared.upgrade() else {
                    break;
                };

                match session.try_send_payload(&create_keepalive_message(32)).await {
                    Ok(true) => debug!("keep-alive sent"),
                    Ok(false) => debug!("keep-alive skipped (transport busy)"),
                    Err(e) => warn!(error = %e, "keep-alive send failed"),
                }
            }
            debug!("keep-alive timer stopped");
        });

        Self {
            stop_signal,
            task_handle: Some(handle),
        }
    }

    /// Stops the timer.
    pub(crate) fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Relaxed);
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for KeepaliveTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keepalive_message_format() {
        let msg = create_keepalive_message(0);
        assert_eq!(msg[0], MessageType::Ignore as u8);
        assert_eq!(msg.len(), 1 + 4);

        let msg = create_keepalive_message(32);
        assert_eq!(msg.len(), 1 + 4 + 32);
        let data_len = u32::from_be_bytes([msg[1], msg[2], msg[3], msg[4]]);
        assert_eq!(data_len, 32);
    }

    #[test]
    fn test_keepalive_payload_is_random() {
        let a = create_keepalive_message(32);
        let b = create_keepalive_message(32);
        assert_ne!(a[5..], b[5..]);
    }
}
