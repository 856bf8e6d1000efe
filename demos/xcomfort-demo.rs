//! Minimal driver for the xComfort bridge client.
//!
//! Connects, waits for the catalogue to materialize, prints every known
//! device and room once, then follows the first light's state stream.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use xcomfort_bridge::{Bridge, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let ip = args.next().context("usage: xcomfort-demo <bridge-ip> <auth-key>")?;
    let auth_key = args.next().context("usage: xcomfort-demo <bridge-ip> <auth-key>")?;

    info!("==============================================");
    info!("   xcomfort-bridge demo v{}", env!("CARGO_PKG_VERSION"));
    info!("==============================================");

    let bridge = Arc::new(Bridge::new(ip, auth_key));
    bridge.set_logger(Arc::new(|level, message| {
        let prefix = match level {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        eprintln!("[{prefix}] {message}");
    }));

    let run_handle = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.run().await }
    });

    info!("waiting for catalogue...");
    let devices = bridge.get_devices().await;
    let rooms = bridge.get_rooms().await;
    info!("{} devices, {} rooms", devices.len(), rooms.len());

    for device in devices.values() {
        info!("device {}: {} ({:?})", device.id(), device.name(), device.kind());
    }
    for room in rooms.values() {
        info!("room {}: {}", room.id(), room.name());
    }

    if let Some(light) = devices.values().find(|d| matches!(d.kind(), xcomfort_bridge::model::DeviceKind::Light)) {
        info!("following device {} state", light.id());
        let mut subscription = light.subscribe();
        loop {
            tokio::select! {
                state = subscription.next() => {
                    match state {
                        Some(state) => info!("device {} -> {:?}", light.id(), state),
                        None => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    break;
                }
            }
        }
    } else {
        tokio::signal::ctrl_c().await.ok();
    }

    bridge.close().await;
    let _ = run_handle.await;
    Ok(())
}
