//! SSH user authentication (RFC 4252).
//!
//! Message types for the USERAUTH protocol plus [`AuthDriver`], the client
//! driver that walks the configured ordered list of attempts:
//!
//! - `none` - a probe that usually elicits the allowed-method list
//! - `password` - one attempt per configured password, with
//!   PASSWD_CHANGEREQ support
//! - `publickey` - two-phase try-then-sign (RFC 4252 Section 7)
//! - `keyboard-interactive` - INFO_REQUEST/INFO_RESPONSE loop (RFC 4256)
//!
//! The driver is sans-IO: it emits request bytes and consumes reply
//! payloads, so the session can run it over the handshake transport while
//! remaining the sole reader of the socket.

use crate::ssh::config::{AuthAttempt, ConnectionConfig, InfoPrompt};
use crate::ssh::message::{authnum, MessageType};
use crate::ssh::wire::{WireReader, WireWriter};
use hawser_platform::{HawserError, HawserResult};
use tracing::{debug, warn};
use zeroize::Zeroize;

/// Service name requested before authentication.
pub const USERAUTH_SERVICE: &str = "ssh-userauth";

/// Service name every USERAUTH_REQUEST asks to start.
pub const CONNECTION_SERVICE: &str = "ssh-connection";

/// SSH_MSG_USERAUTH_FAILURE (RFC 4252 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// Methods that can continue.
    methods_can_continue: Vec<String>,
    /// Partial success flag.
    partial_success: bool,
}

impl AuthFailure {
    /// Returns the methods that can continue.
    pub fn methods_can_continue(&self) -> &[String] {
        &self.methods_can_continue
    }

    /// Returns the partial-success flag.
    pub fn partial_success(&self) -> bool {
        self.partial_success
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(
            MessageType::UserauthFailure as u8,
            "SSH_MSG_USERAUTH_FAILURE",
        )?;
        let methods_can_continue = r.read_name_list()?;
        let partial_success = r.read_boolean()?;
        Ok(Self {
            methods_can_continue,
            partial_success,
        })
    }
}

/// SSH_MSG_USERAUTH_BANNER (RFC 4252 Section 5.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthBanner {
    /// Banner text.
    message: String,
}

impl AuthBanner {
    /// Returns the banner text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(MessageType::UserauthBanner as u8, "SSH_MSG_USERAUTH_BANNER")?;
        let message = r.read_string_utf8()?;
        let _language_tag = r.read_string()?;
        Ok(Self { message })
    }
}

/// SSH_MSG_USERAUTH_PK_OK (RFC 4252 Section 7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPkOk {
    /// Echoed public key algorithm name.
    algorithm: String,
    /// Echoed public key blob.
    public_key: Vec<u8>,
}

impl AuthPkOk {
    /// Returns the echoed algorithm name.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the echoed public key blob.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(authnum::PK_OK, "SSH_MSG_USERAUTH_PK_OK")?;
        let algorithm = r.read_string_utf8()?;
        let public_key = r.read_string()?;
        Ok(Self {
            algorithm,
            public_key,
        })
    }
}

/// SSH_MSG_USERAUTH_INFO_REQUEST (RFC 4256 Section 3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfoRequest {
    /// Server-chosen name for the interaction.
    name: String,
    /// Free-form instruction text.
    instruction: String,
    /// Prompts in order.
    prompts: Vec<InfoPrompt>,
}

impl AuthInfoRequest {
    /// Returns the interaction name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the instruction text.
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Returns the prompt list.
    pub fn prompts(&self) -> &[InfoPrompt] {
        &self.prompts
    }

    /// Parses the message body.
    pub fn from_bytes(data: &[u8]) -> HawserResult<Self> {
        let mut r = WireReader::new(data);
        r.expect_message(authnum::INFO_REQUEST, "SSH_MSG_USERAUTH_INFO_REQUEST")?;
        let name = r.read_string_utf8()?;
        let instruction = r.read_string_utf8()?;
        let _language_tag = r.read_string()?;
        let count = r.read_u32()?;
        let mut prompts = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let text = r.read_string_utf8()?;
            let echo = r.read_boolean()?;
            prompts.push(InfoPrompt { text, echo });
        }
        Ok(Self {
            name,
            instruction,
            prompts,
        })
    }
}

/// Builds SSH_MSG_USERAUTH_INFO_RESPONSE (RFC 4256 Section 3.4).
pub fn info_response(responses: &[String]) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.put_byte(authnum::INFO_RESPONSE);
    w.put_u32(responses.len() as u32);
    for response in responses {
        w.put_string(response.as_bytes());
    }
    w.into_bytes()
}

/// Builds the SERVICE_REQUEST for "ssh-userauth".
pub fn service_request() -> Vec<u8> {
    let mut w = WireWriter::new();
    w.put_byte(MessageType::ServiceRequest as u8);
    w.put_string(USERAUTH_SERVICE.as_bytes());
    w.into_bytes()
}

/// Request body shared by every method: `byte 50, string user,
/// string service, string method`.
fn request_prefix(username: &str, method: &str) -> WireWriter {
    let mut w = WireWriter::with_capacity(64 + username.len());
    w.put_byte(MessageType::UserauthRequest as u8);
    w.put_string(username.as_bytes());
    w.put_string(CONNECTION_SERVICE.as_bytes());
    w.put_string(method.as_bytes());
    w
}

/// Data a `publickey` signature covers (RFC 4252 Section 7):
/// `string session_id` followed by the unsigned USERAUTH_REQUEST.
pub fn publickey_signature_payload(
    session_id: &[u8],
    username: &str,
    algorithm: &str,
    public_key: &[u8],
) -> Vec<u8> {
    let mut w = WireWriter::with_capacity(session_id.len() + public_key.len() + 128);
    w.put_string(session_id);
    w.put_byte(MessageType::UserauthRequest as u8);
    w.put_string(username.as_bytes());
    w.put_string(CONNECTION_SERVICE.as_bytes());
    w.put_string(b"publickey");
    w.put_boolean(true);
    w.put_string(algorithm.as_bytes());
    w.put_string(public_key);
    w.into_bytes()
}

/// What the session should do after feeding one server message to the
/// driver.
#[derive(Debug)]
pub enum AuthProgress {
    /// Transmit these bytes, then wait for the next USERAUTH message.
    Send(Vec<u8>),
    /// No transmission needed; keep waiting (e.g. after a banner).
    Wait,
    /// The server accepted authentication.
    Authenticated,
}

/// Per-attempt driver state beyond "request sent".
enum MethodPhase {
    /// Waiting for SUCCESS/FAILURE with nothing special pending.
    Simple,
    /// `publickey`: the unsigned query is out, PK_OK may arrive.
    PublicKeyQuery,
    /// `keyboard-interactive`: INFO_REQUESTs may keep arriving.
    Interactive,
    /// `password`: PASSWD_CHANGEREQ may arrive.
    Password,
}

/// Client authentication driver over the configured ordered attempts.
pub struct AuthDriver<'a> {
    config: &'a ConnectionConfig,
    session_id: Vec<u8>,
    /// Index into `config.auth_attempts` currently in flight.
    current: usize,
    /// Attempts that already fully failed this round.
    failed: Vec<bool>,
    phase: MethodPhase,
    /// Allowed-method list from the most recent FAILURE.
    server_allowed: Option<Vec<String>>,
    partial_success: bool,
}

impl<'a> AuthDriver<'a> {
    /// Creates the driver.
    ///
    /// `session_id` is the exchange hash of the first key exchange, needed
    /// for `publickey` signatures.
    pub fn new(config: &'a ConnectionConfig, session_id: Vec<u8>) -> Self {
        Self {
            failed: vec![false; config.auth_attempts.len()],
            config,
            session_id,
            current: 0,
            phase: MethodPhase::Simple,
            server_allowed: None,
            partial_success: false,
        }
    }

    /// Builds the first USERAUTH_REQUEST.
    ///
    /// # Errors
    ///
    /// Returns [`HawserError::Auth`] immediately when no attempts are
    /// configured.
    pub fn first_request(&mut self) -> HawserResult<Vec<u8>> {
        if self.config.auth_attempts.is_empty() {
            return Err(self.exhausted());
        }
        self.current = 0;
        self.build_request(0)
    }

    fn exhausted(&self) -> HawserError {
        HawserError::Auth {
            methods_remaining: self.server_allowed.clone().unwrap_or_default(),
            partial_success: self.partial_success,
        }
    }

    fn build_request(&mut self, index: usize) -> HawserResult<Vec<u8>> {
        let attempt = &self.config.auth_attempts[index];
        debug!(method = attempt.method_name(), "sending USERAUTH_REQUEST");
        match attempt {
            AuthAttempt::None => {
                self.phase = MethodPhase::Simple;
                Ok(request_prefix(&self.config.username, "none").into_bytes())
            }
            AuthAttempt::Password { password } => {
                self.phase = MethodPhase::Password;
                let mut password = password.clone();
                if password.is_empty() {
                    if let Some(prompt) = &self.config.password_prompt {
                        if let Some(entered) = prompt(&self.config.username) {
                            password = entered;
                        }
                    }
                }
                let mut w = request_prefix(&self.config.username, "password");
                w.put_boolean(false);
                w.put_string(password.as_bytes());
                password.zeroize();
                Ok(w.into_bytes())
            }
            AuthAttempt::PublicKey {
                algorithm,
                public_key,
                ..
            } => {
                self.phase = MethodPhase::PublicKeyQuery;
                let mut w = request_prefix(&self.config.username, "publickey");
                w.put_boolean(false);
                w.put_string(algorithm.as_bytes());
                w.put_string(public_key);
                Ok(w.into_bytes())
            }
            AuthAttempt::KeyboardInteractive => {
                self.phase = MethodPhase::Interactive;
                let mut w = request_prefix(&self.config.username, "keyboard-interactive");
                w.put_string(b""); // language tag
                w.put_string(b""); // submethods
                Ok(w.into_bytes())
            }
        }
    }

    /// Marks the current attempt failed and moves to the next eligible one.
    fn advance(&mut self) -> HawserResult<AuthProgress> {
        self.failed[self.current] = true;

        let allowed = self.server_allowed.clone();
        let next = self
            .config
            .auth_attempts
            .iter()
            .enumerate()
            .position(|(i, attempt)| {
                if self.failed[i] {
                    return false;
                }
                match &allowed {
                    Some(list) => list.iter().any(|m| m == attempt.method_name()),
                    None => true,
                }
            });

        match next {
            Some(index) => {
                self.current = index;
                Ok(AuthProgress::Send(self.build_request(index)?))
            }
            None => Err(self.exhausted()),
        }
    }

    /// Consumes one USERAUTH message from the server.
    ///
    /// # Errors
    ///
    /// - [`HawserError::Auth`] once every configured attempt is exhausted
    /// - [`HawserError::Protocol`] on unexpected message numbers
    pub fn handle(&mut self, payload: &[u8]) -> HawserResult<AuthProgress> {
        let Some(&number) = payload.first() else {
            return Err(HawserError::Protocol("empty USERAUTH message".to_string()));
        };

        match number {
            n if n == MessageType::UserauthSuccess as u8 => Ok(AuthProgress::Authenticated),

            n if n == MessageType::UserauthBanner as u8 => {
                let banner = AuthBanner::from_bytes(payload)?;
                if let Some(handler) = &self.config.banner_handler {
                    handler(banner.message());
                }
                Ok(AuthProgress::Wait)
            }

            n if n == MessageType::UserauthFailure as u8 => {
                let failure = AuthFailure::from_bytes(payload)?;
                if failure.partial_success() {
                    debug!(
                        method = self.config.auth_attempts[self.current].method_name(),
                        "partial success, continuing with next method"
                    );
                    self.partial_success = true;
                }
                self.server_allowed = Some(failure.methods_can_continue().to_vec());
                self.advance()
            }

            // 60 is method-specific: PK_OK, INFO_REQUEST or PASSWD_CHANGEREQ.
            n if n == authnum::PK_OK => match self.phase {
                MethodPhase::PublicKeyQuery => {
                    let pk_ok = AuthPkOk::from_bytes(payload)?;
                    let AuthAttempt::PublicKey {
                        algorithm,
                        public_key,
                        signer,
                    } = &self.config.auth_attempts[self.current]
                    else {
                        return Err(HawserError::Protocol(
                            "PK_OK without a publickey attempt in flight".to_string(),
                        ));
                    };
                    if pk_ok.algorithm() != algorithm {
                        warn!(
                            offered = algorithm.as_str(),
                            echoed = pk_ok.algorithm(),
                            "server echoed a different publickey algorithm"
                        );
                    }

                    let to_sign = publickey_signature_payload(
                        &self.session_id,
                        &self.config.username,
                        algorithm,
                        public_key,
                    );
                    let raw_signature = signer(&to_sign)?;

                    let mut sig_blob = WireWriter::new();
                    sig_blob.put_string(algorithm.as_bytes());
                    sig_blob.put_string(&raw_signature);

                    let mut w = request_prefix(&self.config.username, "publickey");
                    w.put_boolean(true);
                    w.put_string(algorithm.as_bytes());
                    w.put_string(public_key);
                    w.put_string(&sig_blob.into_bytes());

                    self.phase = MethodPhase::Simple;
                    Ok(AuthProgress::Send(w.into_bytes()))
                }
                MethodPhase::Interactive => {
                    let request = AuthInfoRequest::from_bytes(payload)?;
                    let responses = match &self.config.interactive_prompt {
                        Some(prompt) => {
                            prompt(request.name(), request.instruction(), request.prompts())
                        }
                        None => {
                            warn!("keyboard-interactive without a prompt handler");
                            vec![String::new(); request.prompts().len()]
                        }
                    };
                    if responses.len() != request.prompts().len() {
                        return Err(HawserError::Protocol(format!(
                            "prompt handler returned {} responses for {} prompts",
                            responses.len(),
                            request.prompts().len()
                        )));
                    }
                    Ok(AuthProgress::Send(info_response(&responses)))
                }
                MethodPhase::Password => {
                    // PASSWD_CHANGEREQ: retry with a new password when a
                    // prompt is available, otherwise give up on the method.
                    let mut r = WireReader::new(payload);
                    r.expect_message(
                        authnum::PASSWD_CHANGEREQ,
                        "SSH_MSG_USERAUTH_PASSWD_CHANGEREQ",
                    )?;
                    let prompt_text = r.read_string_utf8()?;
                    debug!(prompt = prompt_text.as_str(), "password change requested");

                    let AuthAttempt::Password { password } =
                        &self.config.auth_attempts[self.current]
                    else {
                        return Err(HawserError::Protocol(
                            "PASSWD_CHANGEREQ without a password attempt in flight".to_string(),
                        ));
                    };

                    let new_password = self
                        .config
                        .password_prompt
                        .as_ref()
                        .and_then(|prompt| prompt(&prompt_text));

                    match new_password {
                        Some(new_password) => {
                            let mut w = request_prefix(&self.config.username, "password");
                            w.put_boolean(true);
                            w.put_string(password.as_bytes());
                            w.put_string(new_password.as_bytes());
                            Ok(AuthProgress::Send(w.into_bytes()))
                        }
                        None => self.advance(),
                    }
                }
                MethodPhase::Simple => Err(HawserError::Protocol(
                    "unexpected method-specific reply (60)".to_string(),
                )),
            },

            other => Err(HawserError::Protocol(format!(
                "unexpected message {} during authentication",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::config::Signer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn failure_message(allowed: &[&str], partial: bool) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_byte(MessageType::UserauthFailure as u8);
        w.put_name_list(&allowed.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        w.put_boolean(partial);
        w.into_bytes()
    }

    fn pk_ok_message(algorithm: &str, key: &[u8]) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_byte(authnum::PK_OK);
        w.put_string(algorithm.as_bytes());
        w.put_string(key);
        w.into_bytes()
    }

    fn parse_request(bytes: &[u8]) -> (String, String, String) {
        let mut r = WireReader::new(bytes);
        r.expect_message(50, "SSH_MSG_USERAUTH_REQUEST").unwrap();
        (
            r.read_string_utf8().unwrap(),
            r.read_string_utf8().unwrap(),
            r.read_string_utf8().unwrap(),
        )
    }

    fn config_with(attempts: Vec<AuthAttempt>) -> ConnectionConfig {
        ConnectionConfig {
            username: "alice".to_string(),
            auth_attempts: attempts,
            ..Default::default()
        }
    }

    fn dummy_signer(calls: Arc<AtomicUsize>) -> Signer {
        Box::new(move |_data: &[u8]| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0xAA; 64])
        })
    }

    #[test]
    fn test_service_request_shape() {
        let bytes = service_request();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_byte().unwrap(), 5);
        assert_eq!(r.read_string().unwrap(), b"ssh-userauth");
    }

    #[test]
    fn test_failure_round_trip() {
        let bytes = failure_message(&["publickey", "password"], true);
        let failure = AuthFailure::from_bytes(&bytes).unwrap();
        assert_eq!(failure.methods_can_continue(), ["publickey", "password"]);
        assert!(failure.partial_success());
    }

    #[test]
    fn test_info_request_parsing() {
        let mut w = WireWriter::new();
        w.put_byte(authnum::INFO_REQUEST);
        w.put_string(b"OTP");
        w.put_string(b"Enter your code");
        w.put_string(b"");
        w.put_u32(2);
        w.put_string(b"Code: ");
        w.put_boolean(true);
        w.put_string(b"PIN: ");
        w.put_boolean(false);

        let request = AuthInfoRequest::from_bytes(&w.into_bytes()).unwrap();
        assert_eq!(request.name(), "OTP");
        assert_eq!(request.prompts().len(), 2);
        assert!(request.prompts()[0].echo);
        assert!(!request.prompts()[1].echo);
    }

    #[test]
    fn test_empty_attempt_list_fails_immediately() {
        let config = config_with(vec![]);
        let mut driver = AuthDriver::new(&config, vec![0xAB; 32]);
        let err = driver.first_request().unwrap_err();
        assert!(matches!(err, HawserError::Auth { .. }));
    }

    #[test]
    fn test_password_success() {
        let config = config_with(vec![AuthAttempt::Password {
            password: "secret".to_string(),
        }]);
        let mut driver = AuthDriver::new(&config, vec![0xAB; 32]);

        let request = driver.first_request().unwrap();
        let (user, service, method) = parse_request(&request);
        assert_eq!(user, "alice");
        assert_eq!(service, "ssh-connection");
        assert_eq!(method, "password");

        let progress = driver.handle(&[52]).unwrap();
        assert!(matches!(progress, AuthProgress::Authenticated));
    }

    #[test]
    fn test_publickey_then_password_chain() {
        // Spec scenario: publickey rejected, password accepted; exactly two
        // USERAUTH_REQUESTs.
        let calls = Arc::new(AtomicUsize::new(0));
        let config = config_with(vec![
            AuthAttempt::PublicKey {
                algorithm: "ssh-ed25519".to_string(),
                public_key: b"fake-key-blob".to_vec(),
                signer: dummy_signer(calls.clone()),
            },
            AuthAttempt::Password {
                password: "secret".to_string(),
            },
        ]);
        let mut driver = AuthDriver::new(&config, vec![0xAB; 32]);

        let first = driver.first_request().unwrap();
        assert_eq!(parse_request(&first).2, "publickey");

        // Server rejects the key outright, allowing only password.
        let progress = driver.handle(&failure_message(&["password"], false)).unwrap();
        let AuthProgress::Send(second) = progress else {
            panic!("expected the driver to try password next");
        };
        assert_eq!(parse_request(&second).2, "password");
        assert_eq!(calls.load(Ordering::SeqCst), 0); // never asked to sign

        let progress = driver.handle(&[52]).unwrap();
        assert!(matches!(progress, AuthProgress::Authenticated));
    }

    #[test]
    fn test_publickey_signs_after_pk_ok() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = config_with(vec![AuthAttempt::PublicKey {
            algorithm: "ssh-ed25519".to_string(),
            public_key: b"fake-key-blob".to_vec(),
            signer: dummy_signer(calls.clone()),
        }]);
        let mut driver = AuthDriver::new(&config, vec![0xAB; 32]);

        driver.first_request().unwrap();
        let progress = driver
            .handle(&pk_ok_message("ssh-ed25519", b"fake-key-blob"))
            .unwrap();
        let AuthProgress::Send(signed) = progress else {
            panic!("expected a signed request after PK_OK");
        };
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The signed request sets the signature-present flag.
        let mut r = WireReader::new(&signed);
        r.expect_message(50, "request").unwrap();
        r.read_string().unwrap();
        r.read_string().unwrap();
        assert_eq!(r.read_string_utf8().unwrap(), "publickey");
        assert!(r.read_boolean().unwrap());
    }

    #[test]
    fn test_methods_never_retried_after_full_failure() {
        let config = config_with(vec![
            AuthAttempt::Password {
                password: "first".to_string(),
            },
            AuthAttempt::Password {
                password: "second".to_string(),
            },
        ]);
        let mut driver = AuthDriver::new(&config, vec![0xAB; 32]);

        driver.first_request().unwrap();
        // First password rejected; password still allowed, so the second
        // configured attempt runs.
        let progress = driver.handle(&failure_message(&["password"], false)).unwrap();
        assert!(matches!(progress, AuthProgress::Send(_)));

        // Second rejection exhausts the list even though "password" is
        // still allowed: both attempts already failed this round.
        let err = driver
            .handle(&failure_message(&["password"], false))
            .unwrap_err();
        let HawserError::Auth {
            methods_remaining, ..
        } = err
        else {
            panic!("expected Auth error");
        };
        assert_eq!(methods_remaining, ["password"]);
    }

    #[test]
    fn test_banner_is_not_a_state_change() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let mut config = config_with(vec![AuthAttempt::Password {
            password: "secret".to_string(),
        }]);
        config.banner_handler = Some(Box::new(move |text| {
            seen_clone.lock().unwrap().push(text.to_string());
        }));

        let mut driver = AuthDriver::new(&config, vec![0xAB; 32]);
        driver.first_request().unwrap();

        let mut w = WireWriter::new();
        w.put_byte(MessageType::UserauthBanner as u8);
        w.put_string(b"welcome to the machine");
        w.put_string(b"");

        let progress = driver.handle(&w.into_bytes()).unwrap();
        assert!(matches!(progress, AuthProgress::Wait));
        assert_eq!(seen.lock().unwrap().as_slice(), ["welcome to the machine"]);

        let progress = driver.handle(&[52]).unwrap();
        assert!(matches!(progress, AuthProgress::Authenticated));
    }

    #[test]
    fn test_keyboard_interactive_loop() {
        let mut config = config_with(vec![AuthAttempt::KeyboardInteractive]);
        config.interactive_prompt = Some(Box::new(|_name, _instruction, prompts| {
            prompts.iter().map(|p| format!("answer-to-{}", p.text)).collect()
        }));
        let mut driver = AuthDriver::new(&config, vec![0xAB; 32]);

        let first = driver.first_request().unwrap();
        assert_eq!(parse_request(&first).2, "keyboard-interactive");

        let mut w = WireWriter::new();
        w.put_byte(authnum::INFO_REQUEST);
        w.put_string(b"");
        w.put_string(b"");
        w.put_string(b"");
        w.put_u32(1);
        w.put_string(b"Password: ");
        w.put_boolean(false);

        let AuthProgress::Send(response) = driver.handle(&w.into_bytes()).unwrap() else {
            panic!("expected INFO_RESPONSE");
        };
        let mut r = WireReader::new(&response);
        assert_eq!(r.read_byte().unwrap(), authnum::INFO_RESPONSE);
        assert_eq!(r.read_u32().unwrap(), 1);
        assert_eq!(r.read_string().unwrap(), b"answer-to-Password: ");

        let progress = driver.handle(&[52]).unwrap();
        assert!(matches!(progress, AuthProgress::Authenticated));
    }

    #[test]
    fn test_signature_payload_layout() {
        let payload =
            publickey_signature_payload(&[0x01; 4], "alice", "ssh-ed25519", b"key-blob");
        let mut r = WireReader::new(&payload);
        assert_eq!(r.read_string().unwrap(), vec![0x01; 4]);
        assert_eq!(r.read_byte().unwrap(), 50);
        assert_eq!(r.read_string().unwrap(), b"alice");
        assert_eq!(r.read_string().unwrap(), b"ssh-connection");
        assert_eq!(r.read_string().unwrap(), b"publickey");
        assert!(r.read_boolean().unwrap());
        assert_eq!(r.read_string().unwrap(), b"ssh-ed25519");
        assert_eq!(r.read_string().unwrap(), b"key-blob");
        assert_eq!(r.remaining(), 0);
    }
}
