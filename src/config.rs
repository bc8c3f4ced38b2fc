//! Connection and security configuration.
//!
//! [`ChannelConfig`] describes one endpoint and the transport policy applied
//! to it. It is read once at channel construction and never consulted again,
//! so it is effectively immutable at use time.
//!
//! [`TlsConfig`] is different: its owner may keep mutating it after a channel
//! has been built from it. The security-context cache therefore never keys on
//! the config object itself. It keys on a [`TlsFingerprint`], an owned value
//! snapshot of the fields taken at lookup time, so a later in-place mutation
//! cannot retroactively change the key of an installed cache entry.

use std::path::PathBuf;

use crate::error::{QuerywireError, Result};

/// Default maximum inbound message size: 128 MiB.
pub const DEFAULT_MAX_INBOUND_MESSAGE_SIZE: usize = 128 * 1024 * 1024;

/// Default keep-alive time in seconds. Zero disables keep-alive.
pub const DEFAULT_KEEP_ALIVE_TIME_SECS: u64 = 0;

/// Default keep-alive timeout in seconds.
pub const DEFAULT_KEEP_ALIVE_TIMEOUT_SECS: u64 = 20;

/// Default graceful shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Configuration for one client channel.
///
/// Construct with [`ChannelConfig::new`] and adjust with the `with_*`
/// methods. All fields have working defaults except host and port.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Remote host name or address.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Skip TLS entirely and connect in plaintext.
    pub use_plaintext: bool,
    /// Maximum size in bytes the call layer should accept for one inbound
    /// message. Policy only; the channel records it, the call layer enforces it.
    pub max_inbound_message_size: usize,
    /// Keep-alive probe time in seconds. Zero or unset disables keep-alive.
    pub keep_alive_time_secs: u64,
    /// Keep-alive probe timeout in seconds. Ignored when keep-alive is disabled.
    pub keep_alive_timeout_secs: u64,
    /// Whether keep-alive probes are sent on a connection with no active calls.
    pub keep_alive_without_calls: bool,
    /// How long `close()` waits for in-flight calls to drain.
    pub shutdown_timeout_secs: u64,
    /// Security configuration, used only when `use_plaintext` is false.
    pub tls: TlsConfig,
}

impl ChannelConfig {
    /// Create a config for `host:port` with default policy (TLS with
    /// compiled-in web-PKI roots, keep-alive disabled, 10s shutdown timeout).
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            use_plaintext: false,
            max_inbound_message_size: DEFAULT_MAX_INBOUND_MESSAGE_SIZE,
            keep_alive_time_secs: DEFAULT_KEEP_ALIVE_TIME_SECS,
            keep_alive_timeout_secs: DEFAULT_KEEP_ALIVE_TIMEOUT_SECS,
            keep_alive_without_calls: false,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            tls: TlsConfig::default(),
        }
    }

    /// Connect in plaintext instead of TLS.
    pub fn with_plaintext(mut self, plaintext: bool) -> Self {
        self.use_plaintext = plaintext;
        self
    }

    /// Set the maximum inbound message size in bytes.
    pub fn with_max_inbound_message_size(mut self, bytes: usize) -> Self {
        self.max_inbound_message_size = bytes;
        self
    }

    /// Set the keep-alive time in seconds. Zero disables keep-alive.
    pub fn with_keep_alive_time_secs(mut self, secs: u64) -> Self {
        self.keep_alive_time_secs = secs;
        self
    }

    /// Set the keep-alive timeout in seconds.
    pub fn with_keep_alive_timeout_secs(mut self, secs: u64) -> Self {
        self.keep_alive_timeout_secs = secs;
        self
    }

    /// Allow keep-alive probes while no calls are active.
    pub fn with_keep_alive_without_calls(mut self, enabled: bool) -> Self {
        self.keep_alive_without_calls = enabled;
        self
    }

    /// Set the graceful shutdown timeout in seconds.
    pub fn with_shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    /// Set the security configuration.
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Validate connection parameters. Called by the channel factory before
    /// any construction work happens.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(QuerywireError::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(QuerywireError::Config("port must not be zero".into()));
        }
        if self.max_inbound_message_size == 0 {
            return Err(QuerywireError::Config(
                "max inbound message size must not be zero".into(),
            ));
        }
        if self.keep_alive_time_secs > 0 && self.keep_alive_timeout_secs == 0 {
            return Err(QuerywireError::Config(
                "keep-alive timeout must not be zero when keep-alive is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Security configuration: key material, trust material, crypto provider.
///
/// All fields are optional. With no fields set the context trusts the
/// compiled-in web-PKI roots and presents no client certificate.
///
/// The owner may mutate this after channels have been built from it. The
/// cache is immune to that (it keys on a [`TlsFingerprint`] snapshot), but a
/// mutated config will fingerprint differently on the *next* lookup and so
/// trigger a fresh context build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM file with the client certificate chain, for mutual TLS.
    pub cert_chain_path: Option<PathBuf>,
    /// PEM file with the client private key, for mutual TLS.
    pub private_key_path: Option<PathBuf>,
    /// PEM bundle of trusted CA certificates. When unset, compiled-in
    /// web-PKI roots are used.
    pub ca_bundle_path: Option<PathBuf>,
    /// Named crypto provider ("ring" or "aws-lc"). When unset, the default
    /// provider is used.
    pub provider: Option<String>,
}

impl TlsConfig {
    /// Create an empty security configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client certificate chain PEM path.
    pub fn with_cert_chain(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_chain_path = Some(path.into());
        self
    }

    /// Set the client private key PEM path.
    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Set the trusted CA bundle PEM path.
    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle_path = Some(path.into());
        self
    }

    /// Set the crypto provider by name ("ring" or "aws-lc").
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Snapshot the current field values into a cache key.
    ///
    /// The fingerprint owns copies of every field, so mutating `self`
    /// afterwards has no effect on fingerprints already taken.
    pub fn fingerprint(&self) -> TlsFingerprint {
        TlsFingerprint {
            cert_chain_path: self.cert_chain_path.clone(),
            private_key_path: self.private_key_path.clone(),
            ca_bundle_path: self.ca_bundle_path.clone(),
            provider: self.provider.clone(),
        }
    }
}

/// Value-type cache key: a snapshot of [`TlsConfig`] fields at lookup time.
///
/// Two configs with equal field contents always produce equal fingerprints,
/// regardless of identity; a config mutated after a lookup produces a
/// different fingerprint on the next lookup without disturbing entries keyed
/// by the old one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TlsFingerprint {
    cert_chain_path: Option<PathBuf>,
    private_key_path: Option<PathBuf>,
    ca_bundle_path: Option<PathBuf>,
    provider: Option<String>,
}
