//! Transport layer: TCP and TLS-over-TCP connections.

mod conn;

pub use conn::{connect, TransportStream};
