//! SSH client session.
//!
//! [`Session`] owns one TCP connection and multiplexes channels over it.
//!
//! # Concurrency model
//!
//! After the handshake the session spawns one receive task that is the
//! sole reader of the socket. Every other operation encodes its message,
//! registers a one-shot waiter, transmits under the send mutex and
//! suspends on the waiter. The receive task decodes each frame and routes
//! it: KEX messages drive the re-key engine inline, global-request replies
//! resolve a FIFO of waiters, and channel messages feed the target
//! channel's event queue.
//!
//! The send mutex makes (packet, sequence increment, cipher advance) one
//! atomic unit; it is never held across a suspension point that waits on
//! the peer. During a key exchange a watch-gate pauses all non-transport
//! sends until NEWKEYS.

pub mod keepalive;

pub use keepalive::create_keepalive_message;

use crate::ssh::auth::{self, AuthDriver, AuthProgress};
use crate::ssh::channel::{Channel, ChannelEvent, ChannelShared};
use crate::ssh::config::ConnectionConfig;
use crate::ssh::connection::{
    open_failure_reason, ChannelClose, ChannelData, ChannelExtendedData, ChannelFailure,
    ChannelOpen, ChannelOpenConfirmation, ChannelOpenFailure, ChannelRequest, ChannelRequestType,
    ChannelType, ChannelWindowAdjust, DebugMsg, Disconnect, GlobalRequest, GlobalRequestType,
    RequestFailure, RequestSuccess, ServiceAccept, Unimplemented,
};
use crate::ssh::crypto::{CompressionAlgorithm, Deflater, Inflater, PacketCipher};
use crate::ssh::hostkey::{self, HostKeyInfo};
use crate::ssh::kex::{negotiate, ExtInfo, KexInit, NegotiatedAlgorithms, NewKeys};
use crate::ssh::kex_dh::{derive_key, ExchangeOutcome, KexProgress, KeyExchange};
use crate::ssh::message::MessageType;
use crate::ssh::packet::{PacketOpener, PacketSealer, ReceivedPacket};
use crate::ssh::transport::{SessionState, TransportState};
use crate::ssh::version::{Version, MAX_BANNER_LINES};
use crate::ssh::wire::WireReader;
use hawser_platform::{disconnect_reason, HawserError, HawserResult};
use keepalive::KeepaliveTask;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback invoked when the session dies unexpectedly.
pub type DisconnectHandler = Box<dyn Fn(&HawserError) + Send + Sync>;

/// Output of [`Session::exec`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Bytes from the command's stdout.
    pub stdout: Vec<u8>,
    /// Bytes from the command's stderr.
    pub stderr: Vec<u8>,
    /// Exit status, when the server reported one.
    pub exit_status: Option<u32>,
    /// Terminating signal name, when the server reported one.
    pub exit_signal: Option<String>,
}

/// An inbound `forwarded-tcpip` channel accepted from the server.
#[derive(Debug)]
pub struct ForwardedChannel {
    /// Address that accepted the connection on the server.
    pub connected_address: String,
    /// Port that accepted the connection.
    pub connected_port: u32,
    /// Originator address.
    pub originator_address: String,
    /// Originator port.
    pub originator_port: u32,
    /// The channel itself, already confirmed.
    pub channel: Channel,
}

struct WriteState {
    stream: OwnedWriteHalf,
    sealer: PacketSealer,
}

type OpenReply = HawserResult<(Arc<ChannelShared>, mpsc::UnboundedReceiver<ChannelEvent>)>;

struct MuxState {
    channels: HashMap<u32, Arc<ChannelShared>>,
    pending_opens: HashMap<u32, oneshot::Sender<OpenReply>>,
    /// FIFO of global-request waiters: Some(data) on SUCCESS, None on
    /// FAILURE.
    pending_globals: VecDeque<oneshot::Sender<Option<Vec<u8>>>>,
    forward_acceptor: Option<mpsc::UnboundedSender<ForwardedChannel>>,
    free_ids: BTreeSet<u32>,
    next_id: u32,
}

impl MuxState {
    fn new() -> Self {
        Self {
            channels: HashMap::new(),
            pending_opens: HashMap::new(),
            pending_globals: VecDeque::new(),
            forward_acceptor: None,
            free_ids: BTreeSet::new(),
            next_id: 0,
        }
    }

    /// Allocates a channel number, reusing the smallest released one.
    fn allocate_id(&mut self) -> u32 {
        if let Some(&id) = self.free_ids.iter().next() {
            self.free_ids.remove(&id);
            id
        } else {
            let id = self.next_id;
            self.next_id += 1;
            id
        }
    }

    fn release_id(&mut self, id: u32) {
        self.free_ids.insert(id);
    }
}

/// State shared between the session handle, channels, the keep-alive
/// timer and the receive task.
pub(crate) struct SessionShared {
    writer: tokio::sync::Mutex<WriteState>,
    mux: Mutex<MuxState>,
    transport: Mutex<TransportState>,
    /// true while a key exchange is in flight; non-transport sends wait.
    kex_gate: watch::Sender<bool>,
    /// Serializes want-reply global requests so their FIFO pairing holds.
    global_request_lock: tokio::sync::Mutex<()>,
    /// Client KEXINIT already sent for a locally initiated re-key.
    pending_client_kexinit: Mutex<Option<Vec<u8>>>,
    fate: Mutex<Option<HawserError>>,
    disconnect_handlers: Mutex<Vec<DisconnectHandler>>,
    ext_info: Mutex<Option<ExtInfo>>,
    session_id: Vec<u8>,
    config: Arc<ConnectionConfig>,
}

impl SessionShared {
    fn check_fate(&self) -> HawserResult<()> {
        match &*self.fate.lock().expect("fate lock") {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn in_kex(&self) -> bool {
        *self.kex_gate.borrow()
    }

    fn set_gate(&self, in_kex: bool) {
        // send_replace updates the value even with no live subscribers.
        let _ = self.kex_gate.send_replace(in_kex);
    }

    /// Sends a payload immediately (transport messages, KEX traffic).
    async fn send_raw(&self, payload: &[u8]) -> HawserResult<()> {
        let mut writer = self.writer.lock().await;
        let wire = writer.sealer.seal(payload)?;
        writer.stream.write_all(&wire).await?;
        self.transport
            .lock()
            .expect("transport lock")
            .add_bytes(wire.len() as u64);
        Ok(())
    }

    /// Sends a payload after any in-flight key exchange completes.
    pub(crate) async fn send_gated(&self, payload: &[u8]) -> HawserResult<()> {
        self.check_fate()?;
        let mut gate = self.kex_gate.subscribe();
        gate.wait_for(|in_kex| !*in_kex)
            .await
            .map_err(|_| HawserError::Connection("session closed".to_string()))?;
        self.check_fate()?;
        self.send_raw(payload).await
    }

    /// Best-effort send: returns `Ok(false)` instead of waiting when a key
    /// exchange is running or the send mutex is contended.
    pub(crate) async fn try_send_payload(&self, payload: &[u8]) -> HawserResult<bool> {
        self.check_fate()?;
        if self.in_kex() {
            return Ok(false);
        }
        let Ok(mut writer) = self.writer.try_lock() else {
            return Ok(false);
        };
        let wire = writer.sealer.seal(payload)?;
        writer.stream.write_all(&wire).await?;
        self.transport
            .lock()
            .expect("transport lock")
            .add_bytes(wire.len() as u64);
        Ok(true)
    }

    /// Tears the session down: records the fate, wakes every waiter,
    /// best-effort sends DISCONNECT, closes the socket.
    async fn teardown(&self, err: HawserError, send_reason: Option<u32>, notify: bool) {
        let first = {
            let mut fate = self.fate.lock().expect("fate lock");
            if fate.is_none() {
                *fate = Some(err.clone());
                true
            } else {
                false
            }
        };

        {
            let mut transport = self.transport.lock().expect("transport lock");
            if transport.current() != SessionState::Closed {
                let _ = transport.transition(SessionState::Disconnecting);
                let _ = transport.transition(SessionState::Closed);
            }
        }

        if first {
            if let Some(reason) = send_reason {
                let msg = Disconnect::new(reason, &err.to_string());
                if let Ok(mut writer) = self.writer.try_lock() {
                    if let Ok(wire) = writer.sealer.seal(&msg.to_bytes()) {
                        let _ = writer.stream.write_all(&wire).await;
                    }
                }
            }

            // Wake gated senders so they observe the fate.
            self.set_gate(false);

            let (channels, opens, globals) = {
                let mut mux = self.mux.lock().expect("mux lock");
                (
                    std::mem::take(&mut mux.channels),
                    std::mem::take(&mut mux.pending_opens),
                    std::mem::take(&mut mux.pending_globals),
                )
            };
            for channel in channels.values() {
                channel.poison();
            }
            for (_, waiter) in opens {
                let _ = waiter.send(Err(err.clone()));
            }
            drop(globals); // dropping the senders fails the waiters

            {
                let mut writer = self.writer.lock().await;
                let _ = writer.stream.shutdown().await;
            }

            if notify {
                for handler in self
                    .disconnect_handlers
                    .lock()
                    .expect("handlers lock")
                    .iter()
                {
                    handler(&err);
                }
            }
        }
    }
}

/// Cloneable outbound handle given to channels.
#[derive(Clone)]
pub(crate) struct Outbound {
    shared: Arc<SessionShared>,
}

impl Outbound {
    pub(crate) async fn send_payload(&self, payload: &[u8]) -> HawserResult<()> {
        self.shared.send_gated(payload).await
    }
}

/// An SSH client session.
///
/// Construct with [`Session::new`], then [`connect`](Session::connect).
/// Channel and forwarding operations fail with
/// `HawserError::Connection("not connected")` before a successful connect.
pub struct Session {
    config: Arc<ConnectionConfig>,
    shared: Mutex<Option<Arc<SessionShared>>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    keepalive: Mutex<Option<KeepaliveTask>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.shared.lock().expect("session lock").is_some())
            .finish()
    }
}

impl Session {
    /// Creates an unconnected session from configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config: Arc::new(config),
            shared: Mutex::new(None),
            recv_task: Mutex::new(None),
            keepalive: Mutex::new(None),
        }
    }

    fn shared(&self) -> HawserResult<Arc<SessionShared>> {
        self.shared
            .lock()
            .expect("session lock")
            .clone()
            .ok_or_else(|| HawserError::Connection("not connected".to_string()))
    }

    /// Returns true once connected and authenticated.
    pub fn is_connected(&self) -> bool {
        match self.shared() {
            Ok(shared) => shared.check_fate().is_ok(),
            Err(_) => false,
        }
    }

    /// The session identifier (exchange hash of the first key exchange).
    pub fn session_id(&self) -> Option<Vec<u8>> {
        self.shared().ok().map(|s| s.session_id.clone())
    }

    /// The server's EXT_INFO, if it sent one (RFC 8308).
    pub fn server_ext_info(&self) -> Option<ExtInfo> {
        self.shared()
            .ok()
            .and_then(|s| s.ext_info.lock().expect("ext info lock").clone())
    }

    /// Registers a handler for unexpected disconnects. Handlers run on the
    /// receive task and must not block.
    pub fn on_disconnect(&self, handler: DisconnectHandler) {
        if let Ok(shared) = self.shared() {
            shared
                .disconnect_handlers
                .lock()
                .expect("handlers lock")
                .push(handler);
        }
    }

    /// Connects, runs the key exchange and authenticates.
    ///
    /// The whole handshake runs under the configured timeout.
    ///
    /// # Errors
    ///
    /// - [`HawserError::Connection`] for socket failures
    /// - [`HawserError::Kex`] for negotiation, signature or strict-KEX
    ///   failures (including a rejected host key)
    /// - [`HawserError::Auth`] when every configured method fails
    /// - [`HawserError::Timeout`] when the deadline elapses
    /// - [`HawserError::InvalidState`] when already connected
    pub async fn connect(&self, addr: &str) -> HawserResult<()> {
        if self.shared.lock().expect("session lock").is_some() {
            return Err(HawserError::InvalidState("already connected".to_string()));
        }

        let config = Arc::clone(&self.config);
        let handshake = tokio::time::timeout(config.timeout, async {
            let stream = TcpStream::connect(addr).await?;
            let mut handshake = Handshake::new(stream, Arc::clone(&config));
            match handshake.run().await {
                Ok(()) => Ok::<Handshake, HawserError>(handshake),
                Err(err) => {
                    // Best-effort DISCONNECT so the peer learns why.
                    handshake.fail(&err).await;
                    Err(err)
                }
            }
        })
        .await
        .map_err(|_| HawserError::Timeout)??;

        let (shared, recv_task) = handshake.into_session();

        if let Some(interval) = config.keep_alive_interval {
            *self.keepalive.lock().expect("keepalive lock") =
                Some(KeepaliveTask::spawn(interval, Arc::downgrade(&shared)));
        }

        *self.shared.lock().expect("session lock") = Some(shared);
        *self.recv_task.lock().expect("recv task lock") = Some(recv_task);
        info!(addr, "session established");
        Ok(())
    }

    /// Sends a DISCONNECT and closes the socket. Idempotent.
    pub async fn disconnect(&self) -> HawserResult<()> {
        let shared = {
            let mut guard = self.shared.lock().expect("session lock");
            guard.take()
        };
        if let Some(shared) = shared {
            shared
                .teardown(
                    HawserError::Connection("disconnected by application".to_string()),
                    Some(disconnect_reason::BY_APPLICATION),
                    false,
                )
                .await;
        }
        if let Some(task) = self.recv_task.lock().expect("recv task lock").take() {
            task.abort();
        }
        if let Some(mut keepalive) = self.keepalive.lock().expect("keepalive lock").take() {
            keepalive.stop();
        }
        Ok(())
    }

    /// Sends a raw service payload on the transport, waiting out any
    /// in-flight re-key. This is the escape hatch for collaborators (e.g.
    /// an SFTP layer) that assemble their own messages.
    pub async fn send_message(&self, payload: &[u8]) -> HawserResult<()> {
        self.shared()?.send_gated(payload).await
    }

    /// Best-effort variant of [`send_message`](Self::send_message):
    /// returns `Ok(false)` instead of waiting.
    pub async fn try_send_message(&self, payload: &[u8]) -> HawserResult<bool> {
        self.shared()?.try_send_payload(payload).await
    }

    /// Requests a re-key now. No-op when one is already running.
    pub async fn rekey(&self) -> HawserResult<()> {
        let shared = self.shared()?;
        initiate_rekey(&shared).await
    }

    /// Opens a `session` channel.
    pub async fn open_session_channel(&self) -> HawserResult<Channel> {
        self.open_channel(ChannelType::Session).await
    }

    /// Opens a `direct-tcpip` channel for local port forwarding.
    pub async fn open_direct_tcpip(
        &self,
        host: &str,
        port: u32,
        originator_address: &str,
        originator_port: u32,
    ) -> HawserResult<Channel> {
        self.open_channel(ChannelType::DirectTcpip {
            host: host.to_string(),
            port,
            originator_address: originator_address.to_string(),
            originator_port,
        })
        .await
    }

    async fn open_channel(&self, channel_type: ChannelType) -> HawserResult<Channel> {
        let shared = self.shared()?;
        let config = Arc::clone(&self.config);

        let (local_id, rx) = {
            let mut mux = shared.mux.lock().expect("mux lock");
            let id = mux.allocate_id();
            let (tx, rx) = oneshot::channel();
            mux.pending_opens.insert(id, tx);
            (id, rx)
        };

        let open = ChannelOpen::new(
            channel_type,
            local_id,
            config.channel_initial_window,
            config.channel_max_packet,
        );

        if let Err(e) = shared.send_gated(&open.to_bytes()).await {
            let mut mux = shared.mux.lock().expect("mux lock");
            mux.pending_opens.remove(&local_id);
            mux.release_id(local_id);
            return Err(e);
        }

        let reply = tokio::time::timeout(config.timeout, rx)
            .await
            .map_err(|_| {
                // The confirmation may still arrive; the receive loop will
                // discard it against the dropped waiter.
                let mut mux = shared.mux.lock().expect("mux lock");
                mux.pending_opens.remove(&local_id);
                HawserError::Timeout
            })?
            .map_err(|_| {
                shared
                    .check_fate()
                    .err()
                    .unwrap_or(HawserError::Canceled)
            })?;

        let (channel_shared, events) = reply?;
        Ok(Channel::new(
            channel_shared,
            Outbound {
                shared: Arc::clone(&shared),
            },
            events,
        ))
    }

    /// Sends a global request.
    ///
    /// With `want_reply`, resolves to `Some(response_data)` on
    /// REQUEST_SUCCESS and `None` on REQUEST_FAILURE, paired FIFO with
    /// other outstanding global requests.
    pub async fn global_request(
        &self,
        request: GlobalRequestType,
        want_reply: bool,
    ) -> HawserResult<Option<Vec<u8>>> {
        let shared = self.shared()?;
        let msg = GlobalRequest::new(request, want_reply);

        if !want_reply {
            shared.send_gated(&msg.to_bytes()).await?;
            return Ok(Some(Vec::new()));
        }

        // Enqueue-then-send must be atomic relative to other global
        // requests for the FIFO pairing to hold.
        let rx = {
            let _guard = shared.global_request_lock.lock().await;
            let (tx, rx) = oneshot::channel();
            shared
                .mux
                .lock()
                .expect("mux lock")
                .pending_globals
                .push_back(tx);
            if let Err(e) = shared.send_gated(&msg.to_bytes()).await {
                shared
                    .mux
                    .lock()
                    .expect("mux lock")
                    .pending_globals
                    .pop_back();
                return Err(e);
            }
            rx
        };

        tokio::time::timeout(self.config.timeout, rx)
            .await
            .map_err(|_| HawserError::Timeout)?
            .map_err(|_| {
                shared
                    .check_fate()
                    .err()
                    .unwrap_or(HawserError::Canceled)
            })
    }

    /// Asks the server to listen on `address:port` and returns the bound
    /// port (useful with `port` 0).
    pub async fn tcpip_forward(&self, address: &str, port: u32) -> HawserResult<u32> {
        let reply = self
            .global_request(
                GlobalRequestType::TcpipForward {
                    address: address.to_string(),
                    port,
                },
                true,
            )
            .await?;
        match reply {
            Some(data) => {
                if port == 0 && data.len() >= 4 {
                    let mut r = WireReader::new(&data);
                    Ok(r.read_u32()?)
                } else {
                    Ok(port)
                }
            }
            None => Err(HawserError::Channel(format!(
                "server refused tcpip-forward for {}:{}",
                address, port
            ))),
        }
    }

    /// Cancels a remote forward previously set up with
    /// [`tcpip_forward`](Self::tcpip_forward).
    pub async fn cancel_tcpip_forward(&self, address: &str, port: u32) -> HawserResult<()> {
        let reply = self
            .global_request(
                GlobalRequestType::CancelTcpipForward {
                    address: address.to_string(),
                    port,
                },
                true,
            )
            .await?;
        match reply {
            Some(_) => Ok(()),
            None => Err(HawserError::Channel(format!(
                "server refused cancel-tcpip-forward for {}:{}",
                address, port
            ))),
        }
    }

    /// Takes the stream of inbound `forwarded-tcpip` channels.
    ///
    /// # Errors
    ///
    /// [`HawserError::InvalidState`] when the stream was already taken.
    pub fn incoming_forwarded(&self) -> HawserResult<mpsc::UnboundedReceiver<ForwardedChannel>> {
        let shared = self.shared()?;
        let mut mux = shared.mux.lock().expect("mux lock");
        if mux.forward_acceptor.is_some() {
            return Err(HawserError::InvalidState(
                "forwarded-channel stream already taken".to_string(),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        mux.forward_acceptor = Some(tx);
        Ok(rx)
    }

    /// Runs a command on a fresh session channel and collects its output.
    pub async fn exec(&self, command: &str) -> HawserResult<ExecOutput> {
        let mut channel = self.open_session_channel().await?;

        let accepted = channel
            .send_request(
                ChannelRequestType::Exec {
                    command: command.to_string(),
                },
                true,
            )
            .await?;
        if !accepted {
            let _ = channel.close().await;
            return Err(HawserError::Channel(format!(
                "server refused exec of '{}'",
                command
            )));
        }

        let mut output = ExecOutput::default();
        while let Some(event) = channel.next_event().await {
            match event {
                ChannelEvent::Data(data) => output.stdout.extend_from_slice(&data),
                ChannelEvent::ExtendedData { data, .. } => {
                    output.stderr.extend_from_slice(&data)
                }
                ChannelEvent::ExitStatus(status) => output.exit_status = Some(status),
                ChannelEvent::ExitSignal { signal, .. } => output.exit_signal = Some(signal),
                ChannelEvent::Eof => {}
                ChannelEvent::Closed => break,
            }
        }
        Ok(output)
    }
}

/// Installs a new outbound cipher under the send mutex, directly after the
/// NEWKEYS that announced it.
async fn send_newkeys_and_install(
    shared: &SessionShared,
    cipher: PacketCipher,
    compression: CompressionAlgorithm,
    authenticated: bool,
    reset_seq: bool,
) -> HawserResult<()> {
    let mut writer = shared.writer.lock().await;
    let wire = writer.sealer.seal(&NewKeys::new().to_bytes())?;
    writer.stream.write_all(&wire).await?;
    writer
        .sealer
        .install(cipher, make_deflater(compression, authenticated), reset_seq);
    Ok(())
}

fn make_deflater(algorithm: CompressionAlgorithm, authenticated: bool) -> Deflater {
    let mut deflater = Deflater::new(algorithm);
    match algorithm {
        CompressionAlgorithm::Zlib => deflater.activate(),
        CompressionAlgorithm::ZlibDelayed if authenticated => deflater.activate(),
        _ => {}
    }
    deflater
}

fn make_inflater(algorithm: CompressionAlgorithm, authenticated: bool) -> Inflater {
    let mut inflater = Inflater::new(algorithm);
    match algorithm {
        CompressionAlgorithm::Zlib => inflater.activate(),
        CompressionAlgorithm::ZlibDelayed if authenticated => inflater.activate(),
        _ => {}
    }
    inflater
}

/// Derives the six keys of RFC 4253 Section 7.2 and builds both
/// directional ciphers.
fn derive_cipher_pair(
    negotiated: &NegotiatedAlgorithms,
    outcome: &ExchangeOutcome,
    session_id: &[u8],
) -> HawserResult<(PacketCipher, PacketCipher)> {
    let hash = outcome.hash;
    let k = &outcome.shared_secret;
    let h = &outcome.exchange_hash;

    let iv_c2s = derive_key(hash, k, h, session_id, b'A', negotiated.cipher_c2s.iv_len());
    let iv_s2c = derive_key(hash, k, h, session_id, b'B', negotiated.cipher_s2c.iv_len());
    let key_c2s = derive_key(hash, k, h, session_id, b'C', negotiated.cipher_c2s.key_len());
    let key_s2c = derive_key(hash, k, h, session_id, b'D', negotiated.cipher_s2c.key_len());
    let mac_c2s = derive_key(
        hash,
        k,
        h,
        session_id,
        b'E',
        negotiated.mac_c2s.map_or(0, |m| m.key_len()),
    );
    let mac_s2c = derive_key(
        hash,
        k,
        h,
        session_id,
        b'F',
        negotiated.mac_s2c.map_or(0, |m| m.key_len()),
    );

    let c2s = PacketCipher::new(
        negotiated.cipher_c2s,
        negotiated.mac_c2s,
        &key_c2s,
        &iv_c2s,
        &mac_c2s,
    )?;
    let s2c = PacketCipher::new(
        negotiated.cipher_s2c,
        negotiated.mac_s2c,
        &key_s2c,
        &iv_s2c,
        &mac_s2c,
    )?;
    Ok((c2s, s2c))
}

/// Foreground connection establishment: version exchange, first key
/// exchange and authentication run directly on the stream before the
/// receive task takes over as sole reader.
struct Handshake {
    stream: TcpStream,
    config: Arc<ConnectionConfig>,
    sealer: PacketSealer,
    opener: PacketOpener,
    transport: TransportState,
    client_version: String,
    server_version: String,
    session_id: Vec<u8>,
    ext_info: Option<ExtInfo>,
    compression: (CompressionAlgorithm, CompressionAlgorithm),
}

impl Handshake {
    fn new(stream: TcpStream, config: Arc<ConnectionConfig>) -> Self {
        let transport = TransportState::new(config.rekey_bytes_limit, config.rekey_time_limit);
        Self {
            stream,
            config,
            sealer: PacketSealer::new(),
            opener: PacketOpener::new(),
            transport,
            client_version: String::new(),
            server_version: String::new(),
            session_id: Vec::new(),
            ext_info: None,
            compression: (CompressionAlgorithm::None, CompressionAlgorithm::None),
        }
    }

    async fn run(&mut self) -> HawserResult<()> {
        self.exchange_versions().await?;
        self.initial_key_exchange().await?;
        self.authenticate().await
    }

    /// Best-effort DISCONNECT on a failed handshake.
    async fn fail(&mut self, err: &HawserError) {
        let reason = match err {
            HawserError::Mac(_) => disconnect_reason::MAC_ERROR,
            HawserError::Kex(_) => disconnect_reason::KEY_EXCHANGE_FAILED,
            HawserError::Auth { .. } => disconnect_reason::NO_MORE_AUTH_METHODS,
            HawserError::Protocol(_) => disconnect_reason::PROTOCOL_ERROR,
            // The peer is gone or already told us why; nothing to send.
            _ => return,
        };
        let msg = Disconnect::new(reason, &err.to_string());
        if let Ok(wire) = self.sealer.seal(&msg.to_bytes()) {
            let _ = self.stream.write_all(&wire).await;
        }
        let _ = self.stream.shutdown().await;
    }

    async fn send(&mut self, payload: &[u8]) -> HawserResult<()> {
        let wire = self.sealer.seal(payload)?;
        self.stream.write_all(&wire).await?;
        self.transport.add_bytes(wire.len() as u64);
        Ok(())
    }

    async fn recv(&mut self) -> HawserResult<ReceivedPacket> {
        let packet = self.opener.read_packet(&mut self.stream).await?;
        self.transport.add_bytes(packet.payload.len() as u64 + 32);
        Ok(packet)
    }

    /// Sends our identification line and reads the server's, discarding
    /// banner lines that do not begin with `SSH-`.
    async fn exchange_versions(&mut self) -> HawserResult<()> {
        if !Version::is_valid_product_id(&self.config.product_id) {
            return Err(HawserError::InvalidState(format!(
                "invalid product identifier '{}'",
                self.config.product_id
            )));
        }
        let ours = Version::new(&self.config.product_id, None);
        self.client_version = ours.to_string();
        self.stream.write_all(&ours.to_wire_format()).await?;

        let mut lines_seen = 0;
        loop {
            let mut line = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                self.stream.read_exact(&mut byte).await?;
                if byte[0] == b'\n' {
                    break;
                }
                line.push(byte[0]);
                if line.len() > 1024 {
                    return Err(HawserError::Protocol(
                        "peer identification line too long".to_string(),
                    ));
                }
            }
            let text = String::from_utf8_lossy(&line).into_owned();
            let text = text.trim_end_matches('\r');

            if text.starts_with("SSH-") {
                let version = Version::parse(text)?;
                self.server_version = version.to_string();
                debug!(server = %version, "identification exchanged");
                break;
            }

            // Pre-identification banner text is discarded.
            lines_seen += 1;
            if lines_seen > MAX_BANNER_LINES {
                return Err(HawserError::Protocol(
                    "too many banner lines before identification".to_string(),
                ));
            }
        }

        self.transport.transition(SessionState::VersionExchanged)?;
        Ok(())
    }

    /// Runs the first key exchange, including host key acceptance.
    async fn initial_key_exchange(&mut self) -> HawserResult<()> {
        self.transport.transition(SessionState::KexInProgress)?;

        let our_kexinit = KexInit::from_preferences(&self.config.preferences, true);
        let client_kexinit_bytes = our_kexinit.to_bytes();
        self.send(&client_kexinit_bytes).await?;

        // The server's KEXINIT; only IGNORE/DEBUG may precede it.
        let server_kexinit_bytes = loop {
            let packet = self.recv().await?;
            match packet.payload.first() {
                Some(&n) if n == MessageType::KexInit as u8 => break packet.payload,
                Some(&n)
                    if n == MessageType::Ignore as u8 || n == MessageType::Debug as u8 =>
                {
                    continue
                }
                Some(&n) if n == MessageType::Disconnect as u8 => {
                    let msg = Disconnect::from_bytes(&packet.payload)?;
                    return Err(HawserError::Disconnected {
                        reason: msg.reason,
                        description: msg.description,
                    });
                }
                Some(&n) => {
                    return Err(HawserError::Protocol(format!(
                        "expected SSH_MSG_KEXINIT, got message {}",
                        n
                    )))
                }
                None => return Err(HawserError::Protocol("empty packet".to_string())),
            }
        };
        let server_kexinit = KexInit::from_bytes(&server_kexinit_bytes)?;

        if server_kexinit.advertises_strict_server() {
            self.transport.set_strict_kex();
            debug!("strict key exchange in force");
        }

        let negotiated = negotiate(&our_kexinit, &server_kexinit)?;
        debug!(kex = negotiated.kex.name(), cipher = negotiated.cipher_c2s.name(), "algorithms negotiated");

        let mut kex = KeyExchange::new(
            negotiated.kex,
            &self.client_version,
            &self.server_version,
            client_kexinit_bytes,
            server_kexinit_bytes,
        )?;
        self.send(&kex.initial_message()?).await?;

        let strict = self.transport.strict_kex();
        let outcome = loop {
            let packet = self.recv().await?;
            let number = *packet.payload.first().ok_or_else(|| {
                HawserError::Protocol("empty packet during key exchange".to_string())
            })?;

            if !MessageType::is_kex_message(number) {
                if strict {
                    return Err(HawserError::Kex(format!(
                        "non-KEX message {} during strict key exchange",
                        number
                    )));
                }
                match number {
                    n if n == MessageType::Ignore as u8 || n == MessageType::Debug as u8 => {
                        continue
                    }
                    n if n == MessageType::Disconnect as u8 => {
                        let msg = Disconnect::from_bytes(&packet.payload)?;
                        return Err(HawserError::Disconnected {
                            reason: msg.reason,
                            description: msg.description,
                        });
                    }
                    n => {
                        return Err(HawserError::Protocol(format!(
                            "unexpected message {} during key exchange",
                            n
                        )))
                    }
                }
            }

            match kex.handle(&packet.payload)? {
                KexProgress::Reply(reply) => self.send(&reply).await?,
                KexProgress::Finished(outcome) => break outcome,
            }
        };

        hostkey::verify_signature(
            negotiated.host_key,
            &outcome.host_key_blob,
            &outcome.exchange_hash,
            &outcome.signature_blob,
        )?;

        // Host key acceptance is the caller's decision.
        let info = HostKeyInfo {
            algorithm: negotiated.host_key.name(),
            key_blob: &outcome.host_key_blob,
            fingerprint: hostkey::fingerprint_sha256(&outcome.host_key_blob),
        };
        let accepted = match &self.config.host_key_verifier {
            Some(verifier) => verifier(&info),
            None => false,
        };
        if !accepted {
            return Err(HawserError::Kex(format!(
                "host key rejected ({} {})",
                info.algorithm, info.fingerprint
            )));
        }

        self.transport.pin_session_id(&outcome.exchange_hash);
        self.session_id = outcome.exchange_hash.clone();

        let (c2s, s2c) = derive_cipher_pair(&negotiated, &outcome, &self.session_id)?;

        // NEWKEYS out, then the new outbound cipher; strict KEX resets the
        // sequence counter at the first NEWKEYS.
        self.send(&NewKeys::new().to_bytes()).await?;
        self.sealer.install(
            c2s,
            make_deflater(negotiated.compression_c2s, false),
            strict,
        );

        // NEWKEYS in.
        loop {
            let packet = self.recv().await?;
            match packet.payload.first() {
                Some(&n) if n == MessageType::NewKeys as u8 => break,
                Some(&n)
                    if !strict
                        && (n == MessageType::Ignore as u8 || n == MessageType::Debug as u8) =>
                {
                    continue
                }
                Some(&n) => {
                    return Err(HawserError::Kex(format!(
                        "expected SSH_MSG_NEWKEYS, got message {}",
                        n
                    )))
                }
                None => return Err(HawserError::Protocol("empty packet".to_string())),
            }
        }
        self.opener.install(
            s2c,
            make_inflater(negotiated.compression_s2c, false),
            strict,
        );

        self.transport.transition(SessionState::NewKeys)?;
        self.transport.reset_rekey_tracking(Instant::now());
        self.compression = (negotiated.compression_c2s, negotiated.compression_s2c);
        Ok(())
    }

    /// Requests the ssh-userauth service and runs the configured attempts.
    async fn authenticate(&mut self) -> HawserResult<()> {
        self.send(&auth::service_request()).await?;

        // SERVICE_ACCEPT, possibly preceded by EXT_INFO.
        loop {
            let packet = self.recv().await?;
            match packet.payload.first() {
                Some(&n) if n == MessageType::ServiceAccept as u8 => {
                    let accept = ServiceAccept::from_bytes(&packet.payload)?;
                    if accept.service != auth::USERAUTH_SERVICE {
                        return Err(HawserError::Protocol(format!(
                            "server accepted unexpected service '{}'",
                            accept.service
                        )));
                    }
                    break;
                }
                Some(&n) if n == MessageType::ExtInfo as u8 => {
                    self.ext_info = Some(ExtInfo::from_bytes(&packet.payload)?);
                }
                Some(&n)
                    if n == MessageType::Ignore as u8 || n == MessageType::Debug as u8 =>
                {
                    continue
                }
                Some(&n) if n == MessageType::Disconnect as u8 => {
                    let msg = Disconnect::from_bytes(&packet.payload)?;
                    return Err(HawserError::Disconnected {
                        reason: msg.reason,
                        description: msg.description,
                    });
                }
                Some(&n) => {
                    return Err(HawserError::Protocol(format!(
                        "expected SSH_MSG_SERVICE_ACCEPT, got message {}",
                        n
                    )))
                }
                None => return Err(HawserError::Protocol("empty packet".to_string())),
            }
        }

        let config = Arc::clone(&self.config);
        let mut driver = AuthDriver::new(&config, self.session_id.clone());
        let first = driver.first_request()?;
        self.send(&first).await?;

        loop {
            let packet = self.recv().await?;
            let number = *packet
                .payload
                .first()
                .ok_or_else(|| HawserError::Protocol("empty packet".to_string()))?;

            match number {
                n if n == MessageType::Ignore as u8 || n == MessageType::Debug as u8 => continue,
                n if n == MessageType::ExtInfo as u8 => {
                    self.ext_info = Some(ExtInfo::from_bytes(&packet.payload)?);
                    continue;
                }
                n if n == MessageType::Disconnect as u8 => {
                    let msg = Disconnect::from_bytes(&packet.payload)?;
                    return Err(HawserError::Disconnected {
                        reason: msg.reason,
                        description: msg.description,
                    });
                }
                _ => {}
            }

            match driver.handle(&packet.payload)? {
                AuthProgress::Send(message) => self.send(&message).await?,
                AuthProgress::Wait => continue,
                AuthProgress::Authenticated => break,
            }
        }

        self.transport.transition(SessionState::Authenticated)?;
        info!(user = self.config.username.as_str(), "authenticated");

        // Delayed compression switches on now.
        if self.compression.0 == CompressionAlgorithm::ZlibDelayed {
            self.sealer.enable_compression();
        }
        if self.compression.1 == CompressionAlgorithm::ZlibDelayed {
            self.opener.enable_compression();
        }
        Ok(())
    }

    /// Splits the stream, builds the shared state, and spawns the receive
    /// task (sole reader from here on).
    fn into_session(self) -> (Arc<SessionShared>, JoinHandle<()>) {
        let (read_half, write_half) = self.stream.into_split();
        let (gate_tx, _gate_rx) = watch::channel(false);

        let shared = Arc::new(SessionShared {
            writer: tokio::sync::Mutex::new(WriteState {
                stream: write_half,
                sealer: self.sealer,
            }),
            mux: Mutex::new(MuxState::new()),
            transport: Mutex::new(self.transport),
            kex_gate: gate_tx,
            global_request_lock: tokio::sync::Mutex::new(()),
            pending_client_kexinit: Mutex::new(None),
            fate: Mutex::new(None),
            disconnect_handlers: Mutex::new(Vec::new()),
            ext_info: Mutex::new(self.ext_info),
            session_id: self.session_id,
            config: Arc::clone(&self.config),
        });

        let recv_loop = RecvLoop {
            shared: Arc::clone(&shared),
            reader: read_half,
            opener: self.opener,
            config: self.config,
            client_version: self.client_version,
            server_version: self.server_version,
        };
        let task = tokio::spawn(recv_loop.run());

        (shared, task)
    }
}

/// Starts a re-key from our side: gate the senders and send KEXINIT.
async fn initiate_rekey(shared: &Arc<SessionShared>) -> HawserResult<()> {
    {
        let mut pending = shared
            .pending_client_kexinit
            .lock()
            .expect("pending kexinit lock");
        if pending.is_some() || shared.in_kex() {
            return Ok(());
        }
        let kexinit = KexInit::from_preferences(&shared.config.preferences, false).to_bytes();
        *pending = Some(kexinit);
    }
    shared.set_gate(true);
    let bytes = shared
        .pending_client_kexinit
        .lock()
        .expect("pending kexinit lock")
        .clone()
        .expect("just stored");
    shared.send_raw(&bytes).await
}

/// The background receive task: sole reader of the socket, demultiplexer
/// for every inbound message, and re-key driver.
struct RecvLoop {
    shared: Arc<SessionShared>,
    reader: OwnedReadHalf,
    opener: PacketOpener,
    config: Arc<ConnectionConfig>,
    client_version: String,
    server_version: String,
}

impl RecvLoop {
    async fn run(mut self) {
        let err = loop {
            match self.step().await {
                Ok(()) => {}
                Err(err) => break err,
            }
        };

        let reason = match &err {
            HawserError::Mac(_) => Some(disconnect_reason::MAC_ERROR),
            HawserError::Kex(_) => Some(disconnect_reason::KEY_EXCHANGE_FAILED),
            HawserError::Protocol(_) => Some(disconnect_reason::PROTOCOL_ERROR),
            _ => None,
        };
        warn!(error = %err, "session terminated");
        self.shared.teardown(err, reason, true).await;
    }

    async fn step(&mut self) -> HawserResult<()> {
        let packet = self.opener.read_packet(&mut self.reader).await?;
        {
            let mut transport = self.shared.transport.lock().expect("transport lock");
            transport.add_bytes(packet.payload.len() as u64 + 32);
        }
        self.dispatch(packet).await?;

        // Automatic re-key triggers (1 GiB / 1 hour by default).
        let wants_rekey = {
            let transport = self.shared.transport.lock().expect("transport lock");
            transport.needs_rekey(Instant::now())
        };
        if wants_rekey && !self.shared.in_kex() {
            debug!("re-key limit reached, initiating key exchange");
            initiate_rekey(&self.shared).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, packet: ReceivedPacket) -> HawserResult<()> {
        let number = *packet
            .payload
            .first()
            .ok_or_else(|| HawserError::Protocol("empty packet".to_string()))?;

        match MessageType::from_u8(number) {
            Some(MessageType::Disconnect) => {
                let msg = Disconnect::from_bytes(&packet.payload)?;
                Err(HawserError::Disconnected {
                    reason: msg.reason,
                    description: msg.description,
                })
            }
            Some(MessageType::Ignore) => Ok(()),
            Some(MessageType::Debug) => {
                if let Ok(msg) = DebugMsg::from_bytes(&packet.payload) {
                    debug!(always_display = msg.always_display, "peer debug: {}", msg.message);
                }
                Ok(())
            }
            Some(MessageType::Unimplemented) => {
                if let Ok(msg) = Unimplemented::from_bytes(&packet.payload) {
                    warn!(seq = msg.rejected_seq, "peer rejected a packet as unimplemented");
                }
                Ok(())
            }
            Some(MessageType::ExtInfo) => {
                let info = ExtInfo::from_bytes(&packet.payload)?;
                *self.shared.ext_info.lock().expect("ext info lock") = Some(info);
                Ok(())
            }
            Some(MessageType::KexInit) => self.run_rekey(packet.payload).await,
            Some(MessageType::NewKeys)
            | Some(MessageType::KexEcdhInit)
            | Some(MessageType::KexEcdhReply)
            | Some(MessageType::KexGexInit)
            | Some(MessageType::KexGexReply)
            | Some(MessageType::KexGexRequest) => Err(HawserError::Protocol(format!(
                "key exchange message {} outside a key exchange",
                number
            ))),
            Some(MessageType::GlobalRequest) => self.handle_global_request(&packet.payload).await,
            Some(MessageType::RequestSuccess) => {
                let msg = RequestSuccess::from_bytes(&packet.payload)?;
                self.resolve_global(Some(msg.data))
            }
            Some(MessageType::RequestFailure) => self.resolve_global(None),
            Some(MessageType::ChannelOpen) => self.handle_channel_open(&packet.payload).await,
            Some(MessageType::ChannelOpenConfirmation) => {
                self.handle_open_confirmation(&packet.payload)
            }
            Some(MessageType::ChannelOpenFailure) => self.handle_open_failure(&packet.payload),
            Some(MessageType::ChannelWindowAdjust) => {
                let msg = ChannelWindowAdjust::from_bytes(&packet.payload)?;
                if let Some(channel) = self.channel(msg.recipient_channel) {
                    channel.grow_remote_window(msg.bytes_to_add);
                }
                Ok(())
            }
            Some(MessageType::ChannelData) => {
                let msg = ChannelData::from_bytes(&packet.payload)?;
                self.deliver_data(msg.recipient_channel, None, msg.data).await
            }
            Some(MessageType::ChannelExtendedData) => {
                let msg = ChannelExtendedData::from_bytes(&packet.payload)?;
                self.deliver_data(msg.recipient_channel, Some(msg.data_type), msg.data)
                    .await
            }
            Some(MessageType::ChannelEof) => {
                let msg = crate::ssh::connection::ChannelEof::from_bytes(&packet.payload)?;
                if let Some(channel) = self.channel(msg.recipient_channel) {
                    channel.peer_eof();
                    let _ = channel.events.send(ChannelEvent::Eof);
                }
                Ok(())
            }
            Some(MessageType::ChannelClose) => self.handle_channel_close(&packet.payload).await,
            Some(MessageType::ChannelRequest) => self.handle_channel_request(&packet.payload).await,
            Some(MessageType::ChannelSuccess) => {
                let msg = crate::ssh::connection::ChannelSuccess::from_bytes(&packet.payload)?;
                self.resolve_channel_reply(msg.recipient_channel, true)
            }
            Some(MessageType::ChannelFailure) => {
                let msg = ChannelFailure::from_bytes(&packet.payload)?;
                self.resolve_channel_reply(msg.recipient_channel, false)
            }
            Some(MessageType::ServiceRequest)
            | Some(MessageType::ServiceAccept)
            | Some(MessageType::UserauthRequest)
            | Some(MessageType::UserauthFailure)
            | Some(MessageType::UserauthSuccess)
            | Some(MessageType::UserauthBanner)
            | Some(MessageType::UserauthPkOk)
            | Some(MessageType::UserauthInfoResponse) => Err(HawserError::Protocol(format!(
                "message {} not valid after authentication",
                number
            ))),
            None => {
                // Unknown message numbers are answered with UNIMPLEMENTED,
                // never a disconnect.
                debug!(number, seq = packet.seq, "unknown message, replying UNIMPLEMENTED");
                let reply = Unimplemented {
                    rejected_seq: packet.seq,
                };
                self.shared.send_raw(&reply.to_bytes()).await
            }
        }
    }

    fn channel(&self, id: u32) -> Option<Arc<ChannelShared>> {
        self.shared
            .mux
            .lock()
            .expect("mux lock")
            .channels
            .get(&id)
            .cloned()
    }

    fn resolve_global(&self, result: Option<Vec<u8>>) -> HawserResult<()> {
        let waiter = self
            .shared
            .mux
            .lock()
            .expect("mux lock")
            .pending_globals
            .pop_front();
        match waiter {
            Some(tx) => {
                let _ = tx.send(result);
                Ok(())
            }
            None => Err(HawserError::Protocol(
                "global request reply with no request outstanding".to_string(),
            )),
        }
    }

    fn resolve_channel_reply(&self, id: u32, success: bool) -> HawserResult<()> {
        if let Some(channel) = self.channel(id) {
            match channel.pop_reply_waiter() {
                Some(tx) => {
                    let _ = tx.send(success);
                }
                None => warn!(channel = id, "request reply with no waiter"),
            }
        }
        Ok(())
    }

    async fn handle_global_request(&mut self, payload: &[u8]) -> HawserResult<()> {
        let request = GlobalRequest::from_bytes(payload)?;
        debug!(name = request.request.name(), "global request from server");
        if request.want_reply {
            // A client honors no server-initiated global requests; the
            // reply is exactly one REQUEST_FAILURE.
            self.shared.send_raw(&RequestFailure.to_bytes()).await?;
        }
        Ok(())
    }

    async fn handle_channel_open(&mut self, payload: &[u8]) -> HawserResult<()> {
        // Parse leniently so an unknown channel type still yields the
        // peer's channel number for the failure reply.
        let mut r = WireReader::new(payload);
        r.expect_message(MessageType::ChannelOpen as u8, "SSH_MSG_CHANNEL_OPEN")?;
        let _type_name = r.read_string_utf8()?;
        let sender_channel = r.read_u32()?;

        match ChannelOpen::from_bytes(payload) {
            Ok(open) => {
                if let ChannelType::ForwardedTcpip {
                    connected_address,
                    connected_port,
                    originator_address,
                    originator_port,
                } = open.channel_type
                {
                    return self
                        .accept_forwarded(
                            sender_channel,
                            open.initial_window_size,
                            open.maximum_packet_size,
                            connected_address,
                            connected_port,
                            originator_address,
                            originator_port,
                        )
                        .await;
                }
                let refusal = ChannelOpenFailure::new(
                    sender_channel,
                    open_failure_reason::ADMINISTRATIVELY_PROHIBITED,
                    "channel type not accepted by this client",
                );
                self.shared.send_raw(&refusal.to_bytes()).await
            }
            Err(_) => {
                let refusal = ChannelOpenFailure::new(
                    sender_channel,
                    open_failure_reason::UNKNOWN_CHANNEL_TYPE,
                    "unknown channel type",
                );
                self.shared.send_raw(&refusal.to_bytes()).await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn accept_forwarded(
        &mut self,
        sender_channel: u32,
        remote_window: u32,
        remote_max_packet: u32,
        connected_address: String,
        connected_port: u32,
        originator_address: String,
        originator_port: u32,
    ) -> HawserResult<()> {
        let acceptor = self
            .shared
            .mux
            .lock()
            .expect("mux lock")
            .forward_acceptor
            .clone();
        let Some(acceptor) = acceptor else {
            let refusal = ChannelOpenFailure::new(
                sender_channel,
                open_failure_reason::ADMINISTRATIVELY_PROHIBITED,
                "no forwarding acceptor registered",
            );
            return self.shared.send_raw(&refusal.to_bytes()).await;
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (local_id, channel_shared) = {
            let mut mux = self.shared.mux.lock().expect("mux lock");
            let local_id = mux.allocate_id();
            let channel_shared = Arc::new(ChannelShared::new(
                local_id,
                sender_channel,
                remote_window,
                remote_max_packet,
                self.config.channel_initial_window,
                events_tx,
            ));
            mux.channels.insert(local_id, Arc::clone(&channel_shared));
            (local_id, channel_shared)
        };

        let confirmation = ChannelOpenConfirmation {
            recipient_channel: sender_channel,
            sender_channel: local_id,
            initial_window_size: self.config.channel_initial_window,
            maximum_packet_size: self.config.channel_max_packet,
        };
        self.shared.send_raw(&confirmation.to_bytes()).await?;

        let channel = Channel::new(
            channel_shared,
            Outbound {
                shared: Arc::clone(&self.shared),
            },
            events_rx,
        );
        let forwarded = ForwardedChannel {
            connected_address,
            connected_port,
            originator_address,
            originator_port,
            channel,
        };
        if acceptor.send(forwarded).is_err() {
            warn!("forwarded-channel stream dropped; closing inbound channel");
            let mut mux = self.shared.mux.lock().expect("mux lock");
            if let Some(channel) = mux.channels.remove(&local_id) {
                channel.poison();
            }
            mux.release_id(local_id);
        }
        Ok(())
    }

    fn handle_open_confirmation(&mut self, payload: &[u8]) -> HawserResult<()> {
        let msg = ChannelOpenConfirmation::from_bytes(payload)?;
        let waiter = self
            .shared
            .mux
            .lock()
            .expect("mux lock")
            .pending_opens
            .remove(&msg.recipient_channel);

        let Some(waiter) = waiter else {
            debug!(
                channel = msg.recipient_channel,
                "discarding confirmation for an abandoned open"
            );
            return Ok(());
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let channel_shared = Arc::new(ChannelShared::new(
            msg.recipient_channel,
            msg.sender_channel,
            msg.initial_window_size,
            msg.maximum_packet_size,
            self.config.channel_initial_window,
            events_tx,
        ));
        self.shared
            .mux
            .lock()
            .expect("mux lock")
            .channels
            .insert(msg.recipient_channel, Arc::clone(&channel_shared));

        let _ = waiter.send(Ok((channel_shared, events_rx)));
        Ok(())
    }

    fn handle_open_failure(&mut self, payload: &[u8]) -> HawserResult<()> {
        let msg = ChannelOpenFailure::from_bytes(payload)?;
        let mut mux = self.shared.mux.lock().expect("mux lock");
        let waiter = mux.pending_opens.remove(&msg.recipient_channel);
        mux.release_id(msg.recipient_channel);
        drop(mux);

        if let Some(waiter) = waiter {
            let _ = waiter.send(Err(HawserError::ChannelOpenRefused {
                reason: msg.reason,
                description: msg.description,
            }));
        }
        Ok(())
    }

    async fn deliver_data(
        &mut self,
        id: u32,
        data_type: Option<u32>,
        data: Vec<u8>,
    ) -> HawserResult<()> {
        let Some(channel) = self.channel(id) else {
            warn!(channel = id, "data for unknown channel");
            return Ok(());
        };

        let refill = channel.consume_local_window(data.len() as u32)?;

        let event = match data_type {
            None => ChannelEvent::Data(data),
            Some(data_type) => ChannelEvent::ExtendedData { data_type, data },
        };
        let _ = channel.events.send(event);

        if let Some(bytes_to_add) = refill {
            let adjust = ChannelWindowAdjust {
                recipient_channel: channel.remote_id,
                bytes_to_add,
            };
            self.shared.send_raw(&adjust.to_bytes()).await?;
        }
        Ok(())
    }

    async fn handle_channel_close(&mut self, payload: &[u8]) -> HawserResult<()> {
        let msg = ChannelClose::from_bytes(payload)?;
        let Some(channel) = self.channel(msg.recipient_channel) else {
            return Ok(());
        };

        let owe_close = channel.peer_close();
        if owe_close {
            let reply = ChannelClose {
                recipient_channel: channel.remote_id,
            };
            self.shared.send_raw(&reply.to_bytes()).await?;
        }

        // CLOSE has now been both sent and received: the number is free.
        let mut mux = self.shared.mux.lock().expect("mux lock");
        mux.channels.remove(&msg.recipient_channel);
        mux.release_id(msg.recipient_channel);
        Ok(())
    }

    async fn handle_channel_request(&mut self, payload: &[u8]) -> HawserResult<()> {
        match ChannelRequest::from_bytes(payload) {
            Ok(request) => {
                let Some(channel) = self.channel(request.recipient_channel) else {
                    return Ok(());
                };
                match request.request {
                    ChannelRequestType::ExitStatus { exit_status } => {
                        let _ = channel.events.send(ChannelEvent::ExitStatus(exit_status));
                    }
                    ChannelRequestType::ExitSignal {
                        signal_name,
                        core_dumped,
                        error_message,
                    } => {
                        let _ = channel.events.send(ChannelEvent::ExitSignal {
                            signal: signal_name,
                            core_dumped,
                            message: error_message,
                        });
                    }
                    other => {
                        debug!(
                            name = other.name(),
                            channel = request.recipient_channel,
                            "unhandled channel request from server"
                        );
                        if request.want_reply {
                            let refusal = ChannelFailure {
                                recipient_channel: channel.remote_id,
                            };
                            self.shared.send_raw(&refusal.to_bytes()).await?;
                        }
                    }
                }
                Ok(())
            }
            Err(_) => {
                // Unknown request type: refuse when a reply is wanted.
                let mut r = WireReader::new(payload);
                r.expect_message(MessageType::ChannelRequest as u8, "SSH_MSG_CHANNEL_REQUEST")?;
                let recipient = r.read_u32()?;
                let _name = r.read_string()?;
                let want_reply = r.read_boolean()?;
                if want_reply {
                    if let Some(channel) = self.channel(recipient) {
                        let refusal = ChannelFailure {
                            recipient_channel: channel.remote_id,
                        };
                        self.shared.send_raw(&refusal.to_bytes()).await?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Runs a complete re-key from the server's KEXINIT to both NEWKEYS.
    ///
    /// The receive task owns the inbound cipher state, so the exchange is
    /// driven inline here; outbound channel traffic stays gated until the
    /// new keys are live.
    async fn run_rekey(&mut self, server_kexinit_bytes: Vec<u8>) -> HawserResult<()> {
        self.shared.set_gate(true);
        {
            let mut transport = self.shared.transport.lock().expect("transport lock");
            transport.transition(SessionState::KexInProgress)?;
        }

        // Use the KEXINIT we already sent (locally initiated re-key) or
        // send a fresh one now. Re-key KEXINITs never carry the first-kex
        // markers.
        let client_kexinit_bytes = {
            let pending = self
                .shared
                .pending_client_kexinit
                .lock()
                .expect("pending kexinit lock")
                .take();
            match pending {
                Some(bytes) => bytes,
                None => {
                    let bytes =
                        KexInit::from_preferences(&self.config.preferences, false).to_bytes();
                    self.shared.send_raw(&bytes).await?;
                    bytes
                }
            }
        };

        let our_kexinit = KexInit::from_bytes(&client_kexinit_bytes)?;
        let server_kexinit = KexInit::from_bytes(&server_kexinit_bytes)?;
        let negotiated = negotiate(&our_kexinit, &server_kexinit)?;
        debug!(kex = negotiated.kex.name(), "re-keying");

        let mut kex = KeyExchange::new(
            negotiated.kex,
            &self.client_version,
            &self.server_version,
            client_kexinit_bytes,
            server_kexinit_bytes,
        )?;
        self.shared.send_raw(&kex.initial_message()?).await?;

        let strict = {
            let transport = self.shared.transport.lock().expect("transport lock");
            transport.strict_kex()
        };

        let outcome = loop {
            let packet = self.opener.read_packet(&mut self.reader).await?;
            let number = *packet.payload.first().ok_or_else(|| {
                HawserError::Protocol("empty packet during key exchange".to_string())
            })?;

            if !MessageType::is_kex_message(number) {
                if strict {
                    return Err(HawserError::Kex(format!(
                        "non-KEX message {} during strict key exchange",
                        number
                    )));
                }
                match number {
                    n if n == MessageType::Ignore as u8 || n == MessageType::Debug as u8 => {
                        continue
                    }
                    n if n == MessageType::Disconnect as u8 => {
                        let msg = Disconnect::from_bytes(&packet.payload)?;
                        return Err(HawserError::Disconnected {
                            reason: msg.reason,
                            description: msg.description,
                        });
                    }
                    n => {
                        return Err(HawserError::Protocol(format!(
                            "unexpected message {} during key exchange",
                            n
                        )))
                    }
                }
            }

            match kex.handle(&packet.payload)? {
                KexProgress::Reply(reply) => self.shared.send_raw(&reply).await?,
                KexProgress::Finished(outcome) => break outcome,
            }
        };

        hostkey::verify_signature(
            negotiated.host_key,
            &outcome.host_key_blob,
            &outcome.exchange_hash,
            &outcome.signature_blob,
        )?;

        // The session identifier never changes across re-keys.
        let session_id = self.shared.session_id.clone();
        let (c2s, s2c) = derive_cipher_pair(&negotiated, &outcome, &session_id)?;

        // Sequence counters continue across re-keys; the strict-KEX reset
        // applies only to the connection's first NEWKEYS.
        send_newkeys_and_install(
            &self.shared,
            c2s,
            negotiated.compression_c2s,
            true,
            false,
        )
        .await?;

        loop {
            let packet = self.opener.read_packet(&mut self.reader).await?;
            match packet.payload.first() {
                Some(&n) if n == MessageType::NewKeys as u8 => break,
                Some(&n)
                    if !strict
                        && (n == MessageType::Ignore as u8 || n == MessageType::Debug as u8) =>
                {
                    continue
                }
                Some(&n) => {
                    return Err(HawserError::Kex(format!(
                        "expected SSH_MSG_NEWKEYS, got message {}",
                        n
                    )))
                }
                None => return Err(HawserError::Protocol("empty packet".to_string())),
            }
        }
        self.opener
            .install(s2c, make_inflater(negotiated.compression_s2c, true), false);

        {
            let mut transport = self.shared.transport.lock().expect("transport lock");
            transport.reset_rekey_tracking(Instant::now());
            transport.transition(SessionState::Authenticated)?;
        }
        self.shared.set_gate(false);
        debug!("re-key complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_ids_are_reused_after_release() {
        let mut mux = MuxState::new();
        assert_eq!(mux.allocate_id(), 0);
        assert_eq!(mux.allocate_id(), 1);
        assert_eq!(mux.allocate_id(), 2);

        // A fully closed channel releases its number; the smallest freed
        // number is handed out first.
        mux.release_id(1);
        mux.release_id(0);
        assert_eq!(mux.allocate_id(), 0);
        assert_eq!(mux.allocate_id(), 1);
        assert_eq!(mux.allocate_id(), 3);
    }

    #[test]
    fn test_compression_activation_rules() {
        assert!(!make_deflater(CompressionAlgorithm::None, true).is_active());
        assert!(make_deflater(CompressionAlgorithm::Zlib, false).is_active());
        assert!(!make_deflater(CompressionAlgorithm::ZlibDelayed, false).is_active());
        assert!(make_deflater(CompressionAlgorithm::ZlibDelayed, true).is_active());
        assert!(make_inflater(CompressionAlgorithm::ZlibDelayed, true).is_active());
    }
}
