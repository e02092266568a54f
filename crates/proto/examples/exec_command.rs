//! Connect, run one command, print its output.
//!
//! ```text
//! cargo run --example exec_command -- user@host:22 password "uname -a"
//! ```

use hawser_proto::ssh::config::{AuthAttempt, ConnectionConfig};
use hawser_proto::ssh::session::Session;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let target = args.next().ok_or("usage: exec_command user@host:port password command")?;
    let password = args.next().ok_or("missing password")?;
    let command = args.next().ok_or("missing command")?;

    let (user, addr) = target
        .split_once('@')
        .ok_or("target must be user@host:port")?;

    let mut config = ConnectionConfig::default();
    config.username = user.to_string();
    config.auth_attempts = vec![AuthAttempt::Password { password }];
    config.host_key_verifier = Some(Box::new(|key| {
        eprintln!("host key: {} {}", key.algorithm, key.fingerprint);
        true
    }));

    let session = Session::new(config);
    session.connect(addr).await?;

    let output = session.exec(&command).await?;
    print!("{}", String::from_utf8_lossy(&output.stdout));
    eprint!("{}", String::from_utf8_lossy(&output.stderr));

    session.disconnect().await?;

    std::process::exit(output.exit_status.unwrap_or(0) as i32);
}
