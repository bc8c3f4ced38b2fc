//! Security-context assembly.
//!
//! Turns a [`TlsConfig`] into a ready-to-use rustls client configuration:
//! client identity (certificate chain + private key) for mutual TLS, trust
//! anchors (a configured CA bundle or the compiled-in web-PKI roots), and
//! the selected crypto provider. Insecure mode swaps the trust anchors for
//! a verifier that accepts anything.
//!
//! Construction failures are fatal configuration errors. They are never
//! retried here and never leave a partial context behind.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;

use crate::config::TlsConfig;
use crate::error::{QuerywireError, Result};
use crate::tls::{is_insecure_mode, InsecureServerVerifier};

/// Provider name selected when [`TlsConfig::provider`] is unset.
pub const DEFAULT_PROVIDER: &str = "ring";

/// An assembled encryption context: key material, trust anchors and crypto
/// provider, baked into a rustls [`ClientConfig`](rustls::ClientConfig).
///
/// Expensive to build and immutable once built. Shared by every channel
/// whose [`TlsConfig`] fingerprints to the same value; cloning the `Arc`
/// handed out by the cache is the only way to obtain one in normal use.
pub struct SecurityContext {
    client_config: Arc<rustls::ClientConfig>,
    provider_name: String,
    insecure: bool,
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("provider", &self.provider_name)
            .field("insecure", &self.insecure)
            .finish_non_exhaustive()
    }
}

impl SecurityContext {
    /// Assemble a context from the current field values of `tls`.
    pub(crate) fn build(tls: &TlsConfig) -> Result<Self> {
        tracing::info!(provider = ?tls.provider, "building client security context");

        let provider = select_provider(tls.provider.as_deref())?;
        let provider_name = tls.provider.clone().unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
        let insecure = is_insecure_mode();

        let verifier_stage = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let identity_stage = if insecure {
            tracing::warn!("insecure mode active; building context without certificate validation");
            verifier_stage
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(InsecureServerVerifier::new(&provider)))
        } else {
            verifier_stage.with_root_certificates(load_trust_anchors(tls)?)
        };

        let client_config = match (&tls.cert_chain_path, &tls.private_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let certs = load_certs(cert_path)?;
                let key = load_private_key(key_path)?;
                identity_stage.with_client_auth_cert(certs, key)?
            }
            (None, None) => identity_stage.with_no_client_auth(),
            _ => {
                return Err(QuerywireError::SecurityMaterial(
                    "client certificate chain and private key must be configured together".into(),
                ))
            }
        };

        Ok(Self {
            client_config: Arc::new(client_config),
            provider_name,
            insecure,
        })
    }

    /// The rustls client configuration backing this context.
    pub fn client_config(&self) -> Arc<rustls::ClientConfig> {
        self.client_config.clone()
    }

    /// Name of the crypto provider this context was built with.
    pub fn provider(&self) -> &str {
        &self.provider_name
    }

    /// Whether this context was built with certificate validation bypassed.
    pub fn is_insecure(&self) -> bool {
        self.insecure
    }
}

fn select_provider(name: Option<&str>) -> Result<Arc<CryptoProvider>> {
    match name {
        None | Some("ring") => Ok(Arc::new(rustls::crypto::ring::default_provider())),
        Some("aws-lc") => Ok(Arc::new(rustls::crypto::aws_lc_rs::default_provider())),
        Some(other) => Err(QuerywireError::Config(format!(
            "unknown crypto provider {other:?}, expected \"ring\" or \"aws-lc\""
        ))),
    }
}

/// Trust anchors: the configured CA bundle, or compiled-in web-PKI roots.
fn load_trust_anchors(tls: &TlsConfig) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match &tls.ca_bundle_path {
        Some(path) => {
            let certs = load_certs(path)?;
            let (added, _skipped) = roots.add_parsable_certificates(certs);
            if added == 0 {
                return Err(QuerywireError::SecurityMaterial(format!(
                    "no usable CA certificates in {}",
                    path.display()
                )));
            }
        }
        None => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        QuerywireError::SecurityMaterial(format!("cannot open {}: {e}", path.display()))
    })?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::io::Result<_>>()
        .map_err(|e| {
            QuerywireError::SecurityMaterial(format!("cannot parse {}: {e}", path.display()))
        })?;
    if certs.is_empty() {
        return Err(QuerywireError::SecurityMaterial(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        QuerywireError::SecurityMaterial(format!("cannot open {}: {e}", path.display()))
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| {
            QuerywireError::SecurityMaterial(format!("cannot parse {}: {e}", path.display()))
        })?
        .ok_or_else(|| {
            QuerywireError::SecurityMaterial(format!("no private key found in {}", path.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::set_insecure_mode;
    use std::io::Write;
    use std::sync::Mutex;

    // The insecure flag is process-wide; tests that touch it take this lock.
    static INSECURE_FLAG_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_build_default_context() {
        let _guard = INSECURE_FLAG_LOCK.lock().unwrap();
        let ctx = SecurityContext::build(&TlsConfig::new()).unwrap();
        assert_eq!(ctx.provider(), DEFAULT_PROVIDER);
        assert!(!ctx.is_insecure());
    }

    #[test]
    fn test_build_with_named_providers() {
        let _guard = INSECURE_FLAG_LOCK.lock().unwrap();
        let ring = SecurityContext::build(&TlsConfig::new().with_provider("ring")).unwrap();
        assert_eq!(ring.provider(), "ring");

        let aws = SecurityContext::build(&TlsConfig::new().with_provider("aws-lc")).unwrap();
        assert_eq!(aws.provider(), "aws-lc");
    }

    #[test]
    fn test_unknown_provider_fails() {
        let _guard = INSECURE_FLAG_LOCK.lock().unwrap();
        let err = SecurityContext::build(&TlsConfig::new().with_provider("openssl")).unwrap_err();
        assert!(matches!(err, QuerywireError::Config(_)));
    }

    #[test]
    fn test_missing_ca_bundle_fails() {
        let _guard = INSECURE_FLAG_LOCK.lock().unwrap();
        let tls = TlsConfig::new().with_ca_bundle("/nonexistent/ca.pem");
        let err = SecurityContext::build(&tls).unwrap_err();
        assert!(matches!(err, QuerywireError::SecurityMaterial(_)));
    }

    #[test]
    fn test_garbage_ca_bundle_fails() {
        let _guard = INSECURE_FLAG_LOCK.lock().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not a certificate").unwrap();

        let tls = TlsConfig::new().with_ca_bundle(file.path());
        let err = SecurityContext::build(&tls).unwrap_err();
        assert!(matches!(err, QuerywireError::SecurityMaterial(_)));
    }

    #[test]
    fn test_cert_without_key_fails() {
        let _guard = INSECURE_FLAG_LOCK.lock().unwrap();
        let tls = TlsConfig::new().with_cert_chain("/etc/certs/client.pem");
        let err = SecurityContext::build(&tls).unwrap_err();
        assert!(matches!(err, QuerywireError::SecurityMaterial(_)));
    }

    #[test]
    fn test_insecure_mode_builds_without_trust_material() {
        let _guard = INSECURE_FLAG_LOCK.lock().unwrap();
        set_insecure_mode(true);

        // No CA bundle needed: the skip-validation verifier is installed.
        let tls = TlsConfig::new().with_ca_bundle("/nonexistent/ca.pem");
        let ctx = SecurityContext::build(&tls).unwrap();
        assert!(ctx.is_insecure());

        set_insecure_mode(false);
    }
}
