//! Host check example
//!
//! Connects to a host over SSH, runs a command with streamed output, then
//! checks that the host is still alive and has not rebooted.
//!
//! # Usage
//!
//! ```bash
//! VMLINK_HOST=vm-01.lab VMLINK_USER=ci cargo run --example check_host -- "uname -a"
//! ```
//!
//! Settings are read from `vm-link.toml` in the current directory if present,
//! then from `VMLINK_*` environment variables.
//!
//! # Environment
//!
//! - `VMLINK_HOST`, `VMLINK_USER`, `VMLINK_KEY_PATH`, `VMLINK_PORT`
//! - `RUST_LOG=debug` for per-command logging

use std::env;

use vm_link::config::file::ConfigLoader;
use vm_link::prelude::*;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let command = env::args().nth(1).unwrap_or_else(|| "uptime".to_string());
    let config = ConfigLoader::new().add_path(".").load("vm-link")?;

    println!("Connecting to {}", config.session.address());
    let mut link = ConnectionManager::new(config, SshConnector::new());
    link.connect().await?;

    let result = link
        .execute(&command, None, |line| println!("{line}"))
        .await?;
    println!(
        "'{command}' exited with {} after {:?}",
        result.exit_code(),
        result.elapsed()
    );

    match link.check_health().await? {
        HealthStatus::Healthy => println!("Host is healthy"),
        HealthStatus::Degraded => println!("Host answers ping, but SSH checks failed"),
    }

    let current = link.boot_time().await?;
    match link.check_for_reboot(current) {
        Ok(()) => println!("Boot time unchanged ({current})"),
        Err(e) => println!("{e}"),
    }

    link.disconnect().await;
    Ok(())
}
