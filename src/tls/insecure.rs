//! Process-wide insecure mode.
//!
//! An operator-controlled escape hatch that disables server certificate
//! validation for every security context built after the flag is set.
//! Intended for development and break-glass scenarios only; the flag is
//! consulted at context construction time, so already-cached contexts keep
//! the validation behavior they were built with.

use std::sync::atomic::{AtomicBool, Ordering};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};

static INSECURE_MODE: AtomicBool = AtomicBool::new(false);

/// Enable or disable insecure mode for the whole process.
pub fn set_insecure_mode(enabled: bool) {
    if enabled {
        tracing::warn!("insecure mode enabled; server certificate validation is bypassed");
    }
    INSECURE_MODE.store(enabled, Ordering::Release);
}

/// Whether insecure mode is currently enabled.
pub fn is_insecure_mode() -> bool {
    INSECURE_MODE.load(Ordering::Acquire)
}

/// Certificate verifier that accepts any server certificate.
///
/// Installed only when [`is_insecure_mode`] returns true at context build
/// time. Signature checks are skipped as well; the connection is still
/// encrypted but the peer is unauthenticated.
#[derive(Debug)]
pub(crate) struct InsecureServerVerifier {
    schemes: Vec<SignatureScheme>,
}

impl InsecureServerVerifier {
    pub(crate) fn new(provider: &CryptoProvider) -> Self {
        Self {
            schemes: provider.signature_verification_algorithms.supported_schemes(),
        }
    }
}

impl ServerCertVerifier for InsecureServerVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}
