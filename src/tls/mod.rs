//! Security-context construction and process-wide caching.
//!
//! A [`SecurityContext`] bundles the assembled key material, trust anchors
//! and negotiated crypto provider for one TLS configuration. Building one is
//! expensive (file I/O, PEM parsing, root-store assembly), so contexts are
//! cached process-wide in a [`SecurityContextCache`] keyed by a value
//! snapshot of the configuration ([`TlsFingerprint`]). Many client instances
//! with identical security configuration share a single context.
//!
//! [`TlsFingerprint`]: crate::config::TlsFingerprint

mod cache;
mod context;
mod insecure;

pub use cache::{global_context_cache, SecurityContextCache};
pub use context::{SecurityContext, DEFAULT_PROVIDER};
pub use insecure::{is_insecure_mode, set_insecure_mode};

pub(crate) use insecure::InsecureServerVerifier;
