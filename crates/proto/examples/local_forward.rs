//! Local port forwarding: tunnel a local listener through the server.
//!
//! ```text
//! cargo run --example local_forward -- user@host:22 password 127.0.0.1:8080 target:80
//! ```

use hawser_proto::ssh::config::{AuthAttempt, ConnectionConfig};
use hawser_proto::ssh::forwarding::LocalForward;
use hawser_proto::ssh::session::Session;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let target = args
        .next()
        .ok_or("usage: local_forward user@host:port password local:port remote:port")?;
    let password = args.next().ok_or("missing password")?;
    let local = args.next().ok_or("missing local address")?;
    let remote = args.next().ok_or("missing remote target")?;

    let (user, addr) = target
        .split_once('@')
        .ok_or("target must be user@host:port")?;

    let mut config = ConnectionConfig::default();
    config.username = user.to_string();
    config.auth_attempts = vec![AuthAttempt::Password { password }];
    config.keep_alive_interval = Some(std::time::Duration::from_secs(30));
    config.host_key_verifier = Some(Box::new(|key| {
        eprintln!("host key: {} {}", key.algorithm, key.fingerprint);
        true
    }));

    let session = Arc::new(Session::new(config));
    session.connect(addr).await?;

    let forward = LocalForward::bind(&local, &remote).await?;
    println!("forwarding {} -> {}", forward.local_addr(), forward.target_addr());

    tokio::select! {
        result = forward.run(Arc::clone(&session)) => {
            eprintln!("forward stopped: {:?}", result);
        }
        _ = tokio::signal::ctrl_c() => {
            println!("shutting down");
        }
    }

    session.disconnect().await?;
    Ok(())
}
