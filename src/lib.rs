//! # querywire
//!
//! Transport core for clients of a remote streaming query service.
//!
//! This crate owns exactly three concerns:
//!
//! - **Channel construction**: plaintext or TLS transport to one endpoint,
//!   with keep-alive and inbound message-size policy ([`Channel`]).
//! - **Security-context caching**: clients that share an identical TLS
//!   configuration reuse one expensive-to-build context instead of
//!   rebuilding it per instance ([`tls::SecurityContextCache`]).
//! - **Bounded shutdown**: a client owns its channel for its lifetime and
//!   disposes of it with an idempotent, timeout-bounded `close()`
//!   ([`ClientCore`]).
//!
//! The query protocol itself (request schema, serialization, response
//! streaming) is deliberately out of scope. A concrete client implements
//! [`SubmitQuery`] over the channel this crate hands it.
//!
//! # Example
//!
//! ```ignore
//! use querywire::{ChannelConfig, ClientCore};
//!
//! #[tokio::main]
//! async fn main() -> querywire::Result<()> {
//!     let config = ChannelConfig::new("broker.local", 8090)
//!         .with_keep_alive_time_secs(30)
//!         .with_shutdown_timeout_secs(10);
//!
//!     let client = ClientCore::new(config)?;
//!     // ... issue calls through client.channel() ...
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod tls;
pub mod transport;

mod client;

pub use channel::{Channel, ChannelState, KeepAlive};
pub use client::{ClientCore, SubmitQuery};
pub use config::{ChannelConfig, TlsConfig};
pub use error::{QuerywireError, Result};
pub use tls::{SecurityContext, SecurityContextCache};
