//! Channel construction and lifecycle.
//!
//! A [`Channel`] is the client's logical connection to one remote endpoint.
//! Building one resolves the security context through the process-wide cache
//! (unless the config asks for plaintext), records the message-size and
//! keep-alive policy, and stops there: no network round-trip happens until
//! the first transport acquisition, which performs the TCP connect and TLS
//! handshake lazily.
//!
//! Lifecycle: Open → ShuttingDown → Closed. [`Channel::start_call`] tracks
//! in-flight calls so shutdown can wait, bounded by a timeout, for them to
//! drain. Once a channel is Closed no further calls can be started on it.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard, Notify};

use crate::config::ChannelConfig;
use crate::error::{QuerywireError, Result};
use crate::tls::{global_context_cache, SecurityContext, SecurityContextCache};
use crate::transport::{self, TransportStream};

const STATE_OPEN: u8 = 0;
const STATE_SHUTTING_DOWN: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle state of a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Accepting new calls. The transport may not be connected yet.
    Open,
    /// Shutdown requested; new calls are rejected, in-flight calls drain.
    ShuttingDown,
    /// Fully shut down. No calls may be issued.
    Closed,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            STATE_OPEN => ChannelState::Open,
            STATE_SHUTTING_DOWN => ChannelState::ShuttingDown,
            _ => ChannelState::Closed,
        }
    }
}

/// Keep-alive policy applied to the transport socket at connect time.
///
/// `time_secs` is the idle threshold before the first probe, `timeout_secs`
/// the interval between probes. Probes are TCP-level, so they run on idle
/// connections by nature; `without_calls` records whether the call layer may
/// additionally ping while no calls are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Seconds of idleness before the first probe.
    pub time_secs: u64,
    /// Seconds between probes.
    pub timeout_secs: u64,
    /// Whether liveness probing is wanted even with no active calls.
    pub without_calls: bool,
}

/// A client channel: endpoint, security context, transport policy and
/// lifecycle state. Exclusively owned by one [`ClientCore`](crate::ClientCore).
#[derive(Debug)]
pub struct Channel {
    host: String,
    port: u16,
    security: Option<Arc<SecurityContext>>,
    max_inbound_message_size: usize,
    keep_alive: Option<KeepAlive>,
    state: AtomicU8,
    in_flight: AtomicUsize,
    calls_done: Notify,
    conn: Mutex<Option<TransportStream>>,
}

impl Channel {
    /// Build a channel from `config`, resolving any security context through
    /// the process-wide cache.
    pub fn build(config: &ChannelConfig) -> Result<Self> {
        Self::build_with_cache(config, global_context_cache())
    }

    /// Build a channel resolving the security context through an explicit
    /// cache instead of the global one.
    ///
    /// A plaintext config never touches the cache at all.
    pub fn build_with_cache(config: &ChannelConfig, cache: &SecurityContextCache) -> Result<Self> {
        config.validate()?;

        let security = if config.use_plaintext {
            None
        } else {
            Some(cache.get_or_build(&config.tls)?)
        };

        let keep_alive = (config.keep_alive_time_secs > 0).then(|| KeepAlive {
            time_secs: config.keep_alive_time_secs,
            timeout_secs: config.keep_alive_timeout_secs,
            without_calls: config.keep_alive_without_calls,
        });

        tracing::debug!(
            host = %config.host,
            port = config.port,
            plaintext = config.use_plaintext,
            keep_alive = keep_alive.is_some(),
            "channel built"
        );

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            security,
            max_inbound_message_size: config.max_inbound_message_size,
            keep_alive,
            state: AtomicU8::new(STATE_OPEN),
            in_flight: AtomicUsize::new(0),
            calls_done: Notify::new(),
            conn: Mutex::new(None),
        })
    }

    /// Remote host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remote port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The security context this channel was built with, if encrypted.
    pub fn security_context(&self) -> Option<&Arc<SecurityContext>> {
        self.security.as_ref()
    }

    /// Largest inbound message the call layer should accept, in bytes.
    pub fn max_inbound_message_size(&self) -> usize {
        self.max_inbound_message_size
    }

    /// Keep-alive policy, if enabled.
    pub fn keep_alive(&self) -> Option<&KeepAlive> {
        self.keep_alive.as_ref()
    }

    /// Number of calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Register a call. The returned guard keeps the call counted as
    /// in-flight until dropped; shutdown waits for all guards to drop
    /// (bounded by the shutdown timeout).
    ///
    /// Fails with [`QuerywireError::ChannelClosed`] once shutdown has begun.
    pub fn start_call(&self) -> Result<CallGuard<'_>> {
        // Count first, then re-check state, so shutdown cannot miss a call
        // that raced past the state check.
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        if self.state.load(Ordering::Acquire) != STATE_OPEN {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            self.calls_done.notify_one();
            return Err(QuerywireError::ChannelClosed);
        }
        Ok(CallGuard { channel: self })
    }

    /// Acquire the transport, connecting lazily on first use.
    ///
    /// The handle holds the transport lock; the call layer frames and
    /// multiplexes its traffic over the stream while holding it.
    pub async fn transport(&self) -> Result<TransportHandle<'_>> {
        if self.state() == ChannelState::Closed {
            return Err(QuerywireError::ChannelClosed);
        }

        let mut guard = self.conn.lock().await;
        // Shutdown may have completed while we waited on the lock, with
        // transport teardown deferred to whoever held it. Re-check under
        // the lock and finish that teardown here rather than handing out
        // a live stream on a Closed channel.
        if self.state() == ChannelState::Closed {
            if let Some(mut stream) = guard.take() {
                if let Err(e) = stream.shutdown().await {
                    tracing::error!(error = %e, "transport shutdown error ignored");
                }
            }
            return Err(QuerywireError::ChannelClosed);
        }
        if guard.is_none() {
            let stream = transport::connect(
                &self.host,
                self.port,
                self.security.as_ref(),
                self.keep_alive.as_ref(),
            )
            .await?;
            *guard = Some(stream);
        }
        Ok(TransportHandle { guard })
    }

    /// Drive the channel to Closed, waiting up to `timeout` for in-flight
    /// calls to drain. Returns whether termination was graceful.
    ///
    /// Idempotent: once shutdown has started, further invocations return
    /// immediately without re-triggering anything.
    pub(crate) async fn shutdown(&self, timeout: Duration) -> bool {
        if self
            .state
            .compare_exchange(
                STATE_OPEN,
                STATE_SHUTTING_DOWN,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return true;
        }

        tracing::debug!(host = %self.host, port = self.port, "channel shutting down");
        let graceful = tokio::time::timeout(timeout, self.drained()).await.is_ok();

        // Tear the transport down without blocking past the timeout: if a
        // straggling call still holds the lock, drop handles teardown.
        match self.conn.try_lock() {
            Ok(mut conn) => {
                if let Some(stream) = conn.as_mut() {
                    if let Err(e) = stream.shutdown().await {
                        tracing::error!(error = %e, "transport shutdown error ignored");
                    }
                }
                *conn = None;
            }
            Err(_) => {
                tracing::debug!("transport busy during shutdown; teardown deferred to drop");
            }
        }

        self.state.store(STATE_CLOSED, Ordering::Release);
        graceful
    }

    async fn drained(&self) {
        loop {
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            self.calls_done.notified().await;
        }
    }
}

/// In-flight call marker. Dropping it ends the call for lifecycle purposes.
#[derive(Debug)]
pub struct CallGuard<'a> {
    channel: &'a Channel,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.channel.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.channel.calls_done.notify_one();
    }
}

/// Exclusive access to the connected transport stream.
pub struct TransportHandle<'a> {
    guard: MutexGuard<'a, Option<TransportStream>>,
}

impl std::ops::Deref for TransportHandle<'_> {
    type Target = TransportStream;

    fn deref(&self) -> &TransportStream {
        match self.guard.as_ref() {
            Some(stream) => stream,
            None => unreachable!("transport handle always wraps a connected stream"),
        }
    }
}

impl std::ops::DerefMut for TransportHandle<'_> {
    fn deref_mut(&mut self) -> &mut TransportStream {
        match self.guard.as_mut() {
            Some(stream) => stream,
            None => unreachable!("transport handle always wraps a connected stream"),
        }
    }
}
