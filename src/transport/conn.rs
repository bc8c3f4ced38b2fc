//! Connection establishment.
//!
//! One entry point, [`connect`], owns the whole sequence: TCP connect,
//! keep-alive socket options, and (for encrypted channels) server-name
//! resolution and the TLS handshake. The result is a [`TransportStream`]
//! that reads and writes like any tokio stream regardless of mode.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::channel::KeepAlive;
use crate::error::Result;
use crate::tls::SecurityContext;

/// A connected transport: plain TCP or TLS over TCP.
pub enum TransportStream {
    /// Unencrypted TCP connection.
    Plain(TcpStream),
    /// TLS session over TCP.
    Tls(Box<TlsStream<TcpStream>>),
}

/// Connect to `host:port`, applying `keep_alive` to the socket and running
/// the TLS handshake when a security context is supplied.
pub async fn connect(
    host: &str,
    port: u16,
    security: Option<&Arc<SecurityContext>>,
    keep_alive: Option<&KeepAlive>,
) -> Result<TransportStream> {
    let tcp = TcpStream::connect((host, port)).await?;

    if let Some(ka) = keep_alive {
        apply_keep_alive(&tcp, ka)?;
    }

    match security {
        None => {
            tracing::info!(host, port, "plaintext transport connected");
            Ok(TransportStream::Plain(tcp))
        }
        Some(context) => {
            let server_name = ServerName::try_from(host.to_string())?;
            let connector = TlsConnector::from(context.client_config());
            let tls = connector.connect(server_name, tcp).await?;
            tracing::info!(host, port, provider = context.provider(), "TLS transport connected");
            Ok(TransportStream::Tls(Box::new(tls)))
        }
    }
}

/// Arm TCP keep-alive: probe time maps to the idle threshold, probe timeout
/// to the retransmission interval.
fn apply_keep_alive(stream: &TcpStream, keep_alive: &KeepAlive) -> Result<()> {
    let params = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(keep_alive.time_secs))
        .with_interval(Duration::from_secs(keep_alive.timeout_secs));
    socket2::SockRef::from(stream).set_tcp_keepalive(&params)?;
    Ok(())
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_flush(cx),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for TransportStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportStream::Plain(_) => f.write_str("TransportStream::Plain"),
            TransportStream::Tls(_) => f.write_str("TransportStream::Tls"),
        }
    }
}
