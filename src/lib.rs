//! Client library for the unofficial Eaton xComfort home-automation
//! bridge protocol: a JSON-over-WebSocket wire format behind an
//! RSA→AES handshake, reachable through a reconnecting supervisor that
//! maintains a live catalogue of devices, rooms, and components.
//!
//! ```no_run
//! # async fn run() -> xcomfort_bridge::error::Result<()> {
//! let bridge = xcomfort_bridge::Bridge::new("10.0.0.5", "shared-secret");
//! let handle = tokio::spawn({
//!     let bridge = bridge;
//!     async move { bridge.run().await }
//! });
//! # let _ = handle;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod command;
mod crypto;
mod handshake;
mod transport;

pub mod error;
pub mod logger;
pub mod model;
pub mod protocol;
pub mod state;

pub use bridge::{Bridge, LifecycleState};
pub use logger::{LogLevel, LoggerFn};
