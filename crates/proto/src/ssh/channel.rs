//! SSH channel handles (RFC 4254 Section 5).
//!
//! A [`Channel`] is the caller-facing half of one multiplexed stream. The
//! session's receive loop owns the other half through [`ChannelShared`]:
//! it pushes inbound events into the channel's queue, replenishes the
//! peer's view of our window, and wakes writers blocked on window
//! exhaustion.
//!
//! # Flow control
//!
//! Outbound writes consume the remote window; a single
//! [`send_data`](Channel::send_data) call is split into CHANNEL_DATA
//! messages of at most the remote maximum packet size and yields whenever
//! the window is exhausted, resuming on WINDOW_ADJUST. Inbound data
//! consumes the local window, which the receive loop replenishes once it
//! drops below half of the initial grant.
//!
//! # Closing
//!
//! Channels half-close: EOF ends one direction, CLOSE ends the channel.
//! The local channel number is reclaimable only after CLOSE has been both
//! sent and received.

use crate::ssh::connection::{
    ChannelClose, ChannelData, ChannelEof, ChannelRequest, ChannelRequestType,
};
use crate::ssh::session::Outbound;
use hawser_platform::{HawserError, HawserResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::debug;

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// CHANNEL_OPEN sent, waiting for the peer's confirmation.
    Opening,
    /// Open in both directions.
    Open,
    /// We sent EOF; the peer may still send data.
    SentEof,
    /// The peer sent EOF; we may still send data.
    ReceivedEof,
    /// CHANNEL_CLOSE sent, waiting for the peer's CLOSE.
    Closing,
    /// CLOSE exchanged in both directions.
    Closed,
}

/// Inbound channel events delivered to the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// CHANNEL_DATA payload.
    Data(Vec<u8>),
    /// CHANNEL_EXTENDED_DATA payload (stream 1 = stderr).
    ExtendedData {
        /// Stream code.
        data_type: u32,
        /// Payload bytes.
        data: Vec<u8>,
    },
    /// The peer sent EOF.
    Eof,
    /// The channel is fully closed.
    Closed,
    /// Remote process exit status.
    ExitStatus(u32),
    /// Remote process terminated by a signal.
    ExitSignal {
        /// Signal name without "SIG".
        signal: String,
        /// Whether a core dump was produced.
        core_dumped: bool,
        /// Error text from the server.
        message: String,
    },
}

/// State shared between a [`Channel`] handle and the receive loop.
pub(crate) struct ChannelShared {
    pub(crate) local_id: u32,
    pub(crate) remote_id: u32,
    pub(crate) remote_max_packet: u32,
    pub(crate) initial_local_window: u32,
    pub(crate) state: Mutex<ChannelState>,
    /// Window the peer currently grants us.
    pub(crate) remote_window: Mutex<u64>,
    /// Wakes writers when the remote window grows or the channel dies.
    pub(crate) window_notify: Notify,
    /// Window we currently grant the peer.
    pub(crate) local_window: Mutex<u32>,
    /// FIFO of want-reply waiters for this channel.
    pub(crate) pending_replies: Mutex<VecDeque<oneshot::Sender<bool>>>,
    /// Event queue into the handle.
    pub(crate) events: mpsc::UnboundedSender<ChannelEvent>,
    /// Wakes a `close()` caller once CLOSE has been exchanged.
    pub(crate) closed_notify: Notify,
}

impl ChannelShared {
    pub(crate) fn new(
        local_id: u32,
        remote_id: u32,
        remote_window: u32,
        remote_max_packet: u32,
        initial_local_window: u32,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            local_id,
            remote_id,
            remote_max_packet,
            initial_local_window,
            state: Mutex::new(ChannelState::Open),
            remote_window: Mutex::new(u64::from(remote_window)),
            window_notify: Notify::new(),
            local_window: Mutex::new(initial_local_window),
            pending_replies: Mutex::new(VecDeque::new()),
            events,
            closed_notify: Notify::new(),
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        *self.state.lock().expect("channel state lock")
    }

    /// WINDOW_ADJUST from the peer: grow the window, wake writers.
    pub(crate) fn grow_remote_window(&self, bytes: u32) {
        let mut window = self.remote_window.lock().expect("remote window lock");
        *window = window.saturating_add(u64::from(bytes));
        drop(window);
        self.window_notify.notify_waiters();
    }

    /// Inbound DATA consumed `bytes` of the window we granted. Returns the
    /// replenishment to send, if the buffered window dropped below half of
    /// the initial grant.
    ///
    /// # Errors
    ///
    /// Fails when the peer overruns the window it was granted.
    pub(crate) fn consume_local_window(&self, bytes: u32) -> HawserResult<Option<u32>> {
        let mut window = self.local_window.lock().expect("local window lock");
        if bytes > *window {
            return Err(HawserError::Channel(format!(
                "peer overran the receive window by {} bytes",
                bytes - *window
            )));
        }
        *window -= bytes;
        if *window < self.initial_local_window / 2 {
            let refill = self.initial_local_window - *window;
            *window = self.initial_local_window;
            Ok(Some(refill))
        } else {
            Ok(None)
        }
    }

    /// Marks the peer's EOF.
    pub(crate) fn peer_eof(&self) {
        let mut state = self.state.lock().expect("channel state lock");
        if *state == ChannelState::Open {
            *state = ChannelState::ReceivedEof;
        }
    }

    /// Marks the peer's CLOSE. Returns true when we still owe our own
    /// CLOSE (abrupt close from the peer).
    pub(crate) fn peer_close(&self) -> bool {
        let mut state = self.state.lock().expect("channel state lock");
        let owe_close = *state != ChannelState::Closing;
        *state = ChannelState::Closed;
        drop(state);
        self.window_notify.notify_waiters();
        self.closed_notify.notify_waiters();
        let _ = self.events.send(ChannelEvent::Closed);
        owe_close
    }

    /// Fails the channel because the session died: wake everything.
    pub(crate) fn poison(&self) {
        let mut state = self.state.lock().expect("channel state lock");
        *state = ChannelState::Closed;
        drop(state);
        self.window_notify.notify_waiters();
        self.closed_notify.notify_waiters();
        self.pending_replies
            .lock()
            .expect("pending replies lock")
            .clear();
        let _ = self.events.send(ChannelEvent::Closed);
    }

    /// Pops the next want-reply waiter (FIFO).
    pub(crate) fn pop_reply_waiter(&self) -> Option<oneshot::Sender<bool>> {
        self.pending_replies
            .lock()
            .expect("pending replies lock")
            .pop_front()
    }
}

/// Caller-facing channel handle.
///
/// Created by `Session::open_session_channel` /
/// `Session::open_direct_tcpip`. Dropping the handle does not close the
/// channel; call [`close`](Channel::close).
pub struct Channel {
    shared: Arc<ChannelShared>,
    outbound: Outbound,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    /// Serializes want-reply requests so their FIFO pairing holds.
    request_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("local_id", &self.shared.local_id)
            .field("remote_id", &self.shared.remote_id)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl Channel {
    pub(crate) fn new(
        shared: Arc<ChannelShared>,
        outbound: Outbound,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> Self {
        Self {
            shared,
            outbound,
            events,
            request_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Local channel number.
    pub fn local_id(&self) -> u32 {
        self.shared.local_id
    }

    /// Remote channel number assigned by the peer.
    pub fn remote_id(&self) -> u32 {
        self.shared.remote_id
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    fn ensure_writable(&self) -> HawserResult<()> {
        match self.shared.state() {
            ChannelState::Open | ChannelState::ReceivedEof => Ok(()),
            ChannelState::SentEof => Err(HawserError::Channel(
                "cannot send data after EOF".to_string(),
            )),
            other => Err(HawserError::Channel(format!(
                "channel is not writable in state {:?}",
                other
            ))),
        }
    }

    /// Sends payload bytes on the channel.
    ///
    /// The write is split at the remote maximum packet size and yields
    /// whenever the remote window is exhausted, resuming when the peer
    /// sends WINDOW_ADJUST. Bytes from one call arrive in order.
    ///
    /// # Errors
    ///
    /// - [`HawserError::Channel`] if the channel is closed or EOF was sent
    /// - transport errors from the underlying session
    pub async fn send_data(&self, mut data: &[u8]) -> HawserResult<()> {
        self.ensure_writable()?;

        while !data.is_empty() {
            let take = loop {
                // Register for the wakeup before checking the window, so a
                // WINDOW_ADJUST landing in between is not lost.
                let notified = self.shared.window_notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                {
                    if self.shared.state() == ChannelState::Closed {
                        return Err(HawserError::Channel(
                            "channel closed while writing".to_string(),
                        ));
                    }
                    let mut window =
                        self.shared.remote_window.lock().expect("remote window lock");
                    if *window > 0 {
                        let take = data
                            .len()
                            .min(*window as usize)
                            .min(self.shared.remote_max_packet as usize);
                        *window -= take as u64;
                        break take;
                    }
                }
                debug!(
                    channel = self.shared.local_id,
                    "remote window exhausted, waiting for WINDOW_ADJUST"
                );
                notified.await;
            };

            let (chunk, rest) = data.split_at(take);
            data = rest;
            let msg = ChannelData {
                recipient_channel: self.shared.remote_id,
                data: chunk.to_vec(),
            };
            self.outbound.send_payload(&msg.to_bytes()).await?;
        }
        Ok(())
    }

    /// Sends EOF: no more data will follow from this side.
    pub async fn send_eof(&self) -> HawserResult<()> {
        self.ensure_writable()?;
        {
            let mut state = self.shared.state.lock().expect("channel state lock");
            if *state == ChannelState::Open {
                *state = ChannelState::SentEof;
            }
        }
        let msg = ChannelEof {
            recipient_channel: self.shared.remote_id,
        };
        self.outbound.send_payload(&msg.to_bytes()).await
    }

    /// Sends a channel request.
    ///
    /// With `want_reply`, resolves to the peer's CHANNEL_SUCCESS (`true`)
    /// or CHANNEL_FAILURE (`false`), paired strictly FIFO with other
    /// want-reply requests on this channel.
    pub async fn send_request(
        &self,
        request: ChannelRequestType,
        want_reply: bool,
    ) -> HawserResult<bool> {
        if matches!(
            self.shared.state(),
            ChannelState::Closing | ChannelState::Closed
        ) {
            return Err(HawserError::Channel(
                "cannot send a request on a closed channel".to_string(),
            ));
        }

        let msg = ChannelRequest::new(self.shared.remote_id, request, want_reply);

        if !want_reply {
            self.outbound.send_payload(&msg.to_bytes()).await?;
            return Ok(true);
        }

        // Enqueue the waiter and transmit under one lock so concurrent
        // requests keep their FIFO pairing with SUCCESS/FAILURE.
        let rx = {
            let _guard = self.request_lock.lock().await;
            let (tx, rx) = oneshot::channel();
            self.shared
                .pending_replies
                .lock()
                .expect("pending replies lock")
                .push_back(tx);
            if let Err(e) = self.outbound.send_payload(&msg.to_bytes()).await {
                // Nothing went out; retract the waiter to keep the FIFO
                // aligned with the wire.
                self.shared
                    .pending_replies
                    .lock()
                    .expect("pending replies lock")
                    .pop_back();
                return Err(e);
            }
            rx
        };

        rx.await.map_err(|_| HawserError::Canceled)
    }

    /// Closes the channel and waits for the peer's CLOSE.
    ///
    /// Sends EOF first if this side has not already, then CHANNEL_CLOSE.
    /// Idempotent: closing a closed channel is a no-op.
    pub async fn close(&self) -> HawserResult<()> {
        let needs_eof = {
            let mut state = self.shared.state.lock().expect("channel state lock");
            match *state {
                ChannelState::Closed | ChannelState::Closing => None,
                prev => {
                    *state = ChannelState::Closing;
                    Some(prev == ChannelState::Open || prev == ChannelState::ReceivedEof)
                }
            }
        };

        match needs_eof {
            None => {
                // Already closing: just wait for the peer.
                let notified = self.shared.closed_notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.shared.state() != ChannelState::Closed {
                    notified.await;
                }
                Ok(())
            }
            Some(send_eof) => {
                if send_eof {
                    let eof = ChannelEof {
                        recipient_channel: self.shared.remote_id,
                    };
                    self.outbound.send_payload(&eof.to_bytes()).await?;
                }
                let close = ChannelClose {
                    recipient_channel: self.shared.remote_id,
                };
                let notified = self.shared.closed_notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                self.outbound.send_payload(&close.to_bytes()).await?;
                if self.shared.state() != ChannelState::Closed {
                    notified.await;
                }
                Ok(())
            }
        }
    }

    /// Receives the next inbound event, or `None` once the channel is
    /// closed and the queue is drained.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Non-blocking event poll.
    pub fn try_next_event(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }
}
