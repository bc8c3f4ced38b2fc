//! Error types for querywire.

use thiserror::Error;

/// Main error type for all querywire operations.
///
/// Every variant is a construction-time failure except [`ChannelClosed`],
/// which is returned when a call is started on a channel that has already
/// begun shutting down. Shutdown itself never surfaces errors; see
/// [`ClientCore::close`](crate::ClientCore::close).
///
/// [`ChannelClosed`]: QuerywireError::ChannelClosed
#[derive(Debug, Error)]
pub enum QuerywireError {
    /// Malformed connection or security parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error while connecting or applying socket options.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error while assembling or using a security context.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The configured host is not a valid TLS server name.
    #[error("invalid server name: {0}")]
    InvalidServerName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Key or trust material could not be loaded or parsed.
    #[error("security material error: {0}")]
    SecurityMaterial(String),

    /// A call was started on a channel that is shutting down or closed.
    #[error("channel closed")]
    ChannelClosed,
}

/// Result type alias using QuerywireError.
pub type Result<T> = std::result::Result<T, QuerywireError>;
