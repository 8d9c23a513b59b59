//! Supervise a heater and print its telemetry.
//!
//! Commands are read from stdin, one per line: `start`, `stop`, `level 5`,
//! `temperature 22`, `mode Temperature`.
//!
//! Run with:
//! BLE_MAC_ADDRESS=AA:BB:CC:DD:EE:FF cargo run --example heater_bridge
//!
//! Optional: BLE_PASSKEY, BLE_POLL_INTERVAL (seconds), OVERHEAT_THRESHOLD (°C),
//! TEMP_LEVEL_LIMITING (true/1/yes, anything else disables it).
//! `RUST_LOG` controls verbosity.

use bytes::Bytes;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use vevor_ble_bridge::utils::parse_flag;
use vevor_ble_bridge::{
    BleConnector, CommandKind, Error, Result, Supervisor, SupervisorConfig, TelemetryPublisher,
    TopicRole,
};

/// Prints every value under a `heater/` prefix.
struct PrintPublisher;

#[async_trait::async_trait]
impl TelemetryPublisher for PrintPublisher {
    async fn publish(&self, role: TopicRole, value: String) -> Result<()> {
        println!("heater/{} = {}", role, value);
        Ok(())
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| Error::InvalidParameter {
            name: name.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn load_config() -> Result<SupervisorConfig> {
    let address = std::env::var("BLE_MAC_ADDRESS").map_err(|_| Error::InvalidParameter {
        name: "BLE_MAC_ADDRESS".to_string(),
        value: String::new(),
    })?;

    Ok(SupervisorConfig::new(address)
        .with_passkey(env_or("BLE_PASSKEY", SupervisorConfig::DEFAULT_PASSKEY)?)
        .with_poll_interval(Duration::from_secs(env_or("BLE_POLL_INTERVAL", 2)?))
        .with_overheat_threshold(env_or(
            "OVERHEAT_THRESHOLD",
            SupervisorConfig::DEFAULT_OVERHEAT_THRESHOLD,
        )?)
        .with_temperature_limiting(
            std::env::var("TEMP_LEVEL_LIMITING").map_or(true, |raw| parse_flag(&raw)),
        ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(load_config()?);
    println!("Heater Bridge");
    println!("=============\n");
    println!("Heater: {}", config.ble_address);
    println!("Overheat threshold: {}°C\n", config.overheat_threshold);

    let connector = BleConnector::new(config.clone());
    let supervisor = Arc::new(Supervisor::new(config, connector, PrintPublisher));

    let (tx, rx) = mpsc::channel(8);
    let commands = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.serve_commands(rx).await })
    };

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let (name, payload) = line.trim().split_once(' ').unwrap_or((line.trim(), ""));
            match CommandKind::from_name(name) {
                Some(kind) => {
                    if tx.send((kind, Bytes::from(payload.to_string()))).await.is_err() {
                        break;
                    }
                }
                None => eprintln!("Unknown command: {}", name),
            }
        }
    });

    let result = supervisor
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nExiting...");
        })
        .await;

    commands.abort();
    result
}
