//! End-to-end session tests against a scripted server.
//!
//! The double server speaks just enough SSH for the client under test:
//! version exchange, curve25519-sha256 key exchange with an Ed25519 host
//! key, ChaCha20-Poly1305 packet crypto, and scripted authentication and
//! connection-layer replies. It is built from the crate's own packet
//! primitives, so both sides of every assertion share one wire codec.

use hawser_platform::{disconnect_reason, HawserError};
use hawser_proto::ssh::config::{AuthAttempt, ConnectionConfig};
use hawser_proto::ssh::connection::Disconnect;
use hawser_proto::ssh::crypto::{
    CipherAlgorithm, CompressionAlgorithm, Deflater, Inflater, PacketCipher,
};
use hawser_proto::ssh::kex::{KexInit, NewKeys};
use hawser_proto::ssh::kex_dh::{derive_key, KexHash};
use hawser_proto::ssh::packet::{PacketOpener, PacketSealer};
use hawser_proto::ssh::session::Session;
use hawser_proto::ssh::wire::{WireReader, WireWriter};
use hawser_proto::ssh::AlgorithmPreferences;
use ring::agreement::{agree_ephemeral, EphemeralPrivateKey, UnparsedPublicKey, X25519};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};

const SERVER_VERSION: &str = "SSH-2.0-DoubleServer_1.0";

/// Client configuration that accepts any host key and authenticates with a
/// password the double server will take.
fn client_config() -> ConnectionConfig {
    let mut config = ConnectionConfig::default();
    config.username = "testuser".to_string();
    config.auth_attempts = vec![AuthAttempt::Password {
        password: "testpass".to_string(),
    }];
    config.host_key_verifier = Some(Box::new(|_key| true));
    config
}

struct KexOptions {
    /// Advertise `kex-strict-s-v00@openssh.com`.
    strict_marker: bool,
    /// Inject a DEBUG message between the client's INIT and our REPLY.
    debug_during_kex: bool,
    /// The client sends its KEXINIT first (re-key it initiated).
    client_first: bool,
}

impl KexOptions {
    fn initial(strict: bool) -> Self {
        Self {
            strict_marker: strict,
            debug_during_kex: false,
            client_first: false,
        }
    }
}

struct TestServer {
    stream: TcpStream,
    sealer: PacketSealer,
    opener: PacketOpener,
    host_key: Ed25519KeyPair,
    client_version: String,
    session_id: Vec<u8>,
}

impl TestServer {
    /// Accepts one connection and performs the identification exchange,
    /// preceding it with one line of banner text.
    async fn accept(listener: &TcpListener) -> Self {
        let (mut stream, _) = listener.accept().await.unwrap();

        stream
            .write_all(b"welcome to the test double\r\n")
            .await
            .unwrap();
        stream
            .write_all(format!("{}\r\n", SERVER_VERSION).as_bytes())
            .await
            .unwrap();

        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).await.unwrap();
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        let client_version = String::from_utf8(line)
            .unwrap()
            .trim_end_matches('\r')
            .to_string();
        assert!(client_version.starts_with("SSH-2.0-"));

        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let host_key = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();

        Self {
            stream,
            sealer: PacketSealer::new(),
            opener: PacketOpener::new(),
            host_key,
            client_version,
            session_id: Vec::new(),
        }
    }

    async fn send(&mut self, payload: &[u8]) {
        let wire = self.sealer.seal(payload).unwrap();
        self.stream.write_all(&wire).await.unwrap();
    }

    async fn recv(&mut self) -> Vec<u8> {
        self.opener
            .read_packet(&mut self.stream)
            .await
            .unwrap()
            .payload
    }

    fn host_key_blob(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_string(b"ssh-ed25519");
        w.put_string(self.host_key.public_key().as_ref());
        w.into_bytes()
    }

    /// Runs one complete curve25519-sha256 key exchange. Returns the
    /// client's KEXINIT for marker assertions.
    async fn run_kex(&mut self, opts: KexOptions) -> KexInit {
        let mut prefs = AlgorithmPreferences::default();
        prefs.kex = vec!["curve25519-sha256".to_string()];
        if opts.strict_marker {
            prefs.kex.push("kex-strict-s-v00@openssh.com".to_string());
        }
        prefs.cipher = vec!["chacha20-poly1305@openssh.com".to_string()];
        let server_kexinit = KexInit::from_preferences(&prefs, false);
        let i_s = server_kexinit.to_bytes();

        let i_c = if opts.client_first {
            let i_c = self.recv().await;
            self.send(&i_s).await;
            i_c
        } else {
            self.send(&i_s).await;
            self.recv().await
        };
        assert_eq!(i_c[0], 20, "expected client KEXINIT");
        let client_kexinit = KexInit::from_bytes(&i_c).unwrap();

        // SSH_MSG_KEX_ECDH_INIT
        let init = self.recv().await;
        let mut r = WireReader::new(&init);
        assert_eq!(r.read_byte().unwrap(), 30);
        let q_c = r.read_string().unwrap();

        if opts.debug_during_kex {
            let mut w = WireWriter::new();
            w.put_byte(4); // SSH_MSG_DEBUG
            w.put_boolean(false);
            w.put_string(b"mid-kex chatter");
            w.put_string(b"");
            self.send(&w.into_bytes()).await;
        }

        let rng = SystemRandom::new();
        let server_private = EphemeralPrivateKey::generate(&X25519, &rng).unwrap();
        let q_s = server_private.compute_public_key().unwrap().as_ref().to_vec();
        let shared = agree_ephemeral(
            server_private,
            &UnparsedPublicKey::new(&X25519, q_c.clone()),
            |k| k.to_vec(),
        )
        .unwrap();

        let k_s = self.host_key_blob();
        let exchange_hash = {
            let mut w = WireWriter::new();
            w.put_string(self.client_version.as_bytes());
            w.put_string(SERVER_VERSION.as_bytes());
            w.put_string(&i_c);
            w.put_string(&i_s);
            w.put_string(&k_s);
            w.put_string(&q_c);
            w.put_string(&q_s);
            w.put_mpint(&shared);
            Sha256::digest(w.into_bytes()).to_vec()
        };
        let first_kex = self.session_id.is_empty();
        if first_kex {
            self.session_id = exchange_hash.clone();
        }

        let signature = self.host_key.sign(&exchange_hash);
        let sig_blob = {
            let mut w = WireWriter::new();
            w.put_string(b"ssh-ed25519");
            w.put_string(signature.as_ref());
            w.into_bytes()
        };

        let mut reply = WireWriter::new();
        reply.put_byte(31); // SSH_MSG_KEX_ECDH_REPLY
        reply.put_string(&k_s);
        reply.put_string(&q_s);
        reply.put_string(&sig_blob);
        self.send(&reply.into_bytes()).await;

        // NEWKEYS out, NEWKEYS in (both still under the old keys).
        self.send(&NewKeys::new().to_bytes()).await;
        let newkeys = self.recv().await;
        assert_eq!(newkeys, vec![21]);

        // Install the directional ciphers; strict KEX resets the counters
        // at the connection's first NEWKEYS only.
        let strict =
            opts.strict_marker && client_kexinit.advertises_strict_client();
        let reset = strict && first_kex;

        let key_len = CipherAlgorithm::ChaCha20Poly1305.key_len();
        let h = &exchange_hash;
        let sid = &self.session_id;
        let key_c2s = derive_key(KexHash::Sha256, &shared, h, sid, b'C', key_len);
        let key_s2c = derive_key(KexHash::Sha256, &shared, h, sid, b'D', key_len);

        let c2s =
            PacketCipher::new(CipherAlgorithm::ChaCha20Poly1305, None, &key_c2s, &[], &[])
                .unwrap();
        let s2c =
            PacketCipher::new(CipherAlgorithm::ChaCha20Poly1305, None, &key_s2c, &[], &[])
                .unwrap();

        self.sealer
            .install(s2c, Deflater::new(CompressionAlgorithm::None), reset);
        self.opener
            .install(c2s, Inflater::new(CompressionAlgorithm::None), reset);

        client_kexinit
    }

    /// Accepts "ssh-userauth", then rejects every method except password.
    /// Returns the number of USERAUTH_REQUESTs seen.
    async fn accept_auth(&mut self) -> usize {
        let service_request = self.recv().await;
        assert_eq!(service_request[0], 5);

        let mut accept = WireWriter::new();
        accept.put_byte(6); // SSH_MSG_SERVICE_ACCEPT
        accept.put_string(b"ssh-userauth");
        self.send(&accept.into_bytes()).await;

        let mut requests = 0;
        loop {
            let request = self.recv().await;
            assert_eq!(request[0], 50, "expected USERAUTH_REQUEST");
            requests += 1;

            let mut r = WireReader::new(&request);
            r.read_byte().unwrap();
            let _user = r.read_string_utf8().unwrap();
            let _service = r.read_string_utf8().unwrap();
            let method = r.read_string_utf8().unwrap();

            if method == "password" {
                self.send(&[52]).await; // SSH_MSG_USERAUTH_SUCCESS
                return requests;
            }

            let mut failure = WireWriter::new();
            failure.put_byte(51); // SSH_MSG_USERAUTH_FAILURE
            failure.put_name_list(&["password".to_string()]);
            failure.put_boolean(false);
            self.send(&failure.into_bytes()).await;
        }
    }

    /// Full handshake with the defaults used by most tests.
    async fn establish(&mut self) -> KexInit {
        let client_kexinit = self.run_kex(KexOptions::initial(true)).await;
        self.accept_auth().await;
        client_kexinit
    }

    /// Reads one CHANNEL_OPEN and confirms it with the given grants.
    /// Returns the client's channel number.
    async fn confirm_channel_open(&mut self, window: u32, max_packet: u32) -> u32 {
        let open = self.recv().await;
        let mut r = WireReader::new(&open);
        assert_eq!(r.read_byte().unwrap(), 90);
        let _type = r.read_string_utf8().unwrap();
        let client_channel = r.read_u32().unwrap();

        let mut confirm = WireWriter::new();
        confirm.put_byte(91);
        confirm.put_u32(client_channel);
        confirm.put_u32(0); // our channel number
        confirm.put_u32(window);
        confirm.put_u32(max_packet);
        self.send(&confirm.into_bytes()).await;
        client_channel
    }
}

/// Scenario: the first KEXINIT carries the strict-KEX marker, a re-key
/// KEXINIT does not, and traffic keeps flowing after the re-key.
#[tokio::test]
async fn happy_path_strict_markers_and_rekey() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut server = TestServer::accept(&listener).await;

        let first_kexinit = server.run_kex(KexOptions::initial(true)).await;
        assert!(first_kexinit.advertises_strict_client());
        assert!(first_kexinit
            .kex_algorithms()
            .contains(&"ext-info-c".to_string()));
        server.accept_auth().await;

        // Client-initiated re-key: its KEXINIT arrives first and must not
        // repeat the one-shot markers.
        let rekey_kexinit = server
            .run_kex(KexOptions {
                strict_marker: false,
                debug_during_kex: false,
                client_first: true,
            })
            .await;
        assert!(!rekey_kexinit.advertises_strict_client());
        assert!(!rekey_kexinit
            .kex_algorithms()
            .contains(&"ext-info-c".to_string()));

        // Traffic still works on the new keys: a want-reply global request
        // gets exactly one REQUEST_FAILURE.
        let mut request = WireWriter::new();
        request.put_byte(80);
        request.put_string(b"keepalive@openssh.com");
        request.put_boolean(true);
        server.send(&request.into_bytes()).await;
        let reply = server.recv().await;
        assert_eq!(reply, vec![82]);
    });

    let verifier_called = Arc::new(AtomicBool::new(false));
    let called = Arc::clone(&verifier_called);
    let mut config = client_config();
    config.host_key_verifier = Some(Box::new(move |key| {
        assert_eq!(key.algorithm, "ssh-ed25519");
        assert!(key.fingerprint.starts_with("SHA256:"));
        called.store(true, Ordering::SeqCst);
        true
    }));

    let session = Session::new(config);
    session.connect(&addr.to_string()).await.unwrap();
    assert!(verifier_called.load(Ordering::SeqCst));
    assert!(session.is_connected());

    let session_id_before = session.session_id().unwrap();
    session.rekey().await.unwrap();

    // Give the exchange time to finish, then confirm the session survived
    // with its identifier unchanged.
    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    assert!(session.is_connected());
    assert_eq!(session.session_id().unwrap(), session_id_before);

    session.disconnect().await.unwrap();
}

/// Scenario: a DEBUG message inside a strict key exchange is fatal and the
/// client closes with DISCONNECT reason 3 (KEY_EXCHANGE_FAILED).
#[tokio::test]
async fn strict_kex_violation_disconnects_with_reason_3() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut server = TestServer::accept(&listener).await;

        let mut prefs = AlgorithmPreferences::default();
        prefs.kex = vec![
            "curve25519-sha256".to_string(),
            "kex-strict-s-v00@openssh.com".to_string(),
        ];
        prefs.cipher = vec!["chacha20-poly1305@openssh.com".to_string()];
        let i_s = KexInit::from_preferences(&prefs, false).to_bytes();
        server.send(&i_s).await;
        let _i_c = server.recv().await;
        let _init = server.recv().await;

        // Non-KEX message mid-exchange.
        let mut debug = WireWriter::new();
        debug.put_byte(4);
        debug.put_boolean(false);
        debug.put_string(b"mid-kex chatter");
        debug.put_string(b"");
        server.send(&debug.into_bytes()).await;

        // The client must abort with DISCONNECT reason 3.
        let payload = server.recv().await;
        let disconnect = Disconnect::from_bytes(&payload).unwrap();
        assert_eq!(disconnect.reason, disconnect_reason::KEY_EXCHANGE_FAILED);
    });

    let session = Session::new(client_config());
    let err = session.connect(&addr.to_string()).await.unwrap_err();
    assert!(matches!(err, HawserError::Kex(_)), "got {:?}", err);

    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

/// Scenario: an unknown global request with want_reply answers with exactly
/// one REQUEST_FAILURE and the session stays healthy.
#[tokio::test]
async fn unknown_global_request_gets_one_request_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut server = TestServer::accept(&listener).await;
        server.establish().await;

        for round in 0..2 {
            let mut request = WireWriter::new();
            request.put_byte(80);
            request.put_string(b"unknown-request");
            request.put_boolean(true);
            server.send(&request.into_bytes()).await;

            let reply = server.recv().await;
            assert_eq!(reply, vec![82], "round {}", round);
        }
    });

    let session = Session::new(client_config());
    session.connect(&addr.to_string()).await.unwrap();

    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    assert!(session.is_connected());
    session.disconnect().await.unwrap();
}

/// Scenario: configured [publickey, password]; the server rejects the key
/// offer and accepts the password; exactly two USERAUTH_REQUESTs cross the
/// wire.
#[tokio::test]
async fn auth_chain_publickey_then_password() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut server = TestServer::accept(&listener).await;
        server.run_kex(KexOptions::initial(true)).await;
        let requests = server.accept_auth().await;
        assert_eq!(requests, 2);
    });

    let mut config = client_config();
    config.auth_attempts = vec![
        AuthAttempt::PublicKey {
            algorithm: "ssh-ed25519".to_string(),
            public_key: b"test-public-key-blob".to_vec(),
            signer: Box::new(|_data| Ok(vec![0u8; 64])),
        },
        AuthAttempt::Password {
            password: "testpass".to_string(),
        },
    ];

    let session = Session::new(config);
    session.connect(&addr.to_string()).await.unwrap();

    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    session.disconnect().await.unwrap();
}

/// Scenario: remote window 100 / max packet 32; writing 200 bytes produces
/// DATA(32) DATA(32) DATA(32) DATA(4), blocks, then the same burst again
/// after WINDOW_ADJUST(+150).
#[tokio::test]
async fn channel_flow_control_window_exhaustion() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut server = TestServer::accept(&listener).await;
        server.establish().await;

        let client_channel = server.confirm_channel_open(100, 32).await;

        let mut sizes = Vec::new();
        for _ in 0..4 {
            let payload = server.recv().await;
            let mut r = WireReader::new(&payload);
            assert_eq!(r.read_byte().unwrap(), 94); // CHANNEL_DATA
            let _recipient = r.read_u32().unwrap();
            sizes.push(r.read_string().unwrap().len());
        }
        assert_eq!(sizes, vec![32, 32, 32, 4]);

        // The writer is now blocked on the empty window.
        let blocked =
            timeout(Duration::from_millis(300), server.recv()).await;
        assert!(blocked.is_err(), "writer sent data with a zero window");

        let mut adjust = WireWriter::new();
        adjust.put_byte(93); // CHANNEL_WINDOW_ADJUST
        adjust.put_u32(client_channel);
        adjust.put_u32(150);
        server.send(&adjust.into_bytes()).await;

        let mut sizes = Vec::new();
        for _ in 0..4 {
            let payload = server.recv().await;
            let mut r = WireReader::new(&payload);
            assert_eq!(r.read_byte().unwrap(), 94);
            let _recipient = r.read_u32().unwrap();
            sizes.push(r.read_string().unwrap().len());
        }
        assert_eq!(sizes, vec![32, 32, 32, 4]);
    });

    let session = Session::new(client_config());
    session.connect(&addr.to_string()).await.unwrap();

    let channel = session.open_session_channel().await.unwrap();
    let writer = tokio::spawn(async move {
        channel.send_data(&[0x55u8; 200]).await.unwrap();
        channel
    });

    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    let _channel = timeout(Duration::from_secs(5), writer)
        .await
        .unwrap()
        .unwrap();
    session.disconnect().await.unwrap();
}

/// Scenario: every channel and forwarding operation before connect fails
/// with "not connected" and never touches the network.
#[tokio::test]
async fn operations_before_connect_fail_without_network() {
    let session = Session::new(client_config());

    let err = session.open_session_channel().await.unwrap_err();
    assert_eq!(
        err,
        HawserError::Connection("not connected".to_string())
    );

    let err = session.exec("true").await.unwrap_err();
    assert_eq!(
        err,
        HawserError::Connection("not connected".to_string())
    );

    let err = session
        .open_direct_tcpip("localhost", 80, "127.0.0.1", 1024)
        .await
        .unwrap_err();
    assert!(matches!(err, HawserError::Connection(_)));

    let err = session.tcpip_forward("0.0.0.0", 0).await.unwrap_err();
    assert!(matches!(err, HawserError::Connection(_)));

    let err = session.send_message(&[2, 0, 0, 0, 0]).await.unwrap_err();
    assert!(matches!(err, HawserError::Connection(_)));
}

/// Exit status and output propagate through `exec`.
#[tokio::test]
async fn exec_collects_output_and_exit_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut server = TestServer::accept(&listener).await;
        server.establish().await;

        let client_channel = server.confirm_channel_open(1 << 20, 32 * 1024).await;

        // exec request with want_reply.
        let request = server.recv().await;
        let mut r = WireReader::new(&request);
        assert_eq!(r.read_byte().unwrap(), 98);
        let _recipient = r.read_u32().unwrap();
        assert_eq!(r.read_string_utf8().unwrap(), "exec");
        assert!(r.read_boolean().unwrap());
        assert_eq!(r.read_string_utf8().unwrap(), "uname -a");

        // CHANNEL_SUCCESS, stdout, stderr, exit-status, EOF, CLOSE.
        let mut success = WireWriter::new();
        success.put_byte(99);
        success.put_u32(client_channel);
        server.send(&success.into_bytes()).await;

        let mut data = WireWriter::new();
        data.put_byte(94);
        data.put_u32(client_channel);
        data.put_string(b"Linux double 6.1\n");
        server.send(&data.into_bytes()).await;

        let mut stderr = WireWriter::new();
        stderr.put_byte(95);
        stderr.put_u32(client_channel);
        stderr.put_u32(1);
        stderr.put_string(b"warning: fake\n");
        server.send(&stderr.into_bytes()).await;

        let mut status = WireWriter::new();
        status.put_byte(98);
        status.put_u32(client_channel);
        status.put_string(b"exit-status");
        status.put_boolean(false);
        status.put_u32(0);
        server.send(&status.into_bytes()).await;

        let mut eof = WireWriter::new();
        eof.put_byte(96);
        eof.put_u32(client_channel);
        server.send(&eof.into_bytes()).await;

        let mut close = WireWriter::new();
        close.put_byte(97);
        close.put_u32(client_channel);
        server.send(&close.into_bytes()).await;

        // The client answers an abrupt close with its own CLOSE.
        let reply = server.recv().await;
        assert_eq!(reply[0], 97);
    });

    let session = Session::new(client_config());
    session.connect(&addr.to_string()).await.unwrap();

    let output = session.exec("uname -a").await.unwrap();
    assert_eq!(output.stdout, b"Linux double 6.1\n");
    assert_eq!(output.stderr, b"warning: fake\n");
    assert_eq!(output.exit_status, Some(0));

    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    session.disconnect().await.unwrap();
}

/// An unexpected server disconnect wakes the disconnect hook and fails
/// later operations.
#[tokio::test]
async fn peer_disconnect_fires_event_and_poisons_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut server = TestServer::accept(&listener).await;
        server.establish().await;

        // Wait for the client's ping so its disconnect hook is registered
        // before the DISCONNECT goes out.
        let ping = server.recv().await;
        assert_eq!(ping[0], 2); // SSH_MSG_IGNORE

        let mut disconnect = WireWriter::new();
        disconnect.put_byte(1);
        disconnect.put_u32(disconnect_reason::BY_APPLICATION);
        disconnect.put_string(b"maintenance window");
        disconnect.put_string(b"");
        server.send(&disconnect.into_bytes()).await;
    });

    let session = Session::new(client_config());
    session.connect(&addr.to_string()).await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<HawserError>();
    let tx = std::sync::Mutex::new(Some(tx));
    session.on_disconnect(Box::new(move |err| {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(err.clone());
        }
    }));

    // IGNORE with an empty payload, acting as the synchronization ping.
    session.send_message(&[2, 0, 0, 0, 0]).await.unwrap();

    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();

    let err = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert!(matches!(err, HawserError::Disconnected { reason, .. }
        if reason == disconnect_reason::BY_APPLICATION));

    let err = session.open_session_channel().await.unwrap_err();
    assert!(matches!(err, HawserError::Disconnected { .. }));
}
