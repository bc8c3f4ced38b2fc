//! Client lifecycle.
//!
//! [`ClientCore`] is the reusable base a concrete query client wraps: it
//! owns exactly one [`Channel`] for its whole life, hands it out through an
//! accessor for issuing calls, and disposes of it with a bounded,
//! idempotent [`close`](ClientCore::close).
//!
//! What a "call" looks like on the wire is not this crate's business; the
//! concrete client expresses it by implementing [`SubmitQuery`].

use std::future::Future;
use std::time::Duration;

use crate::channel::{Channel, ChannelState};
use crate::config::ChannelConfig;
use crate::error::Result;

/// The abstract call-issuing capability a concrete client provides.
///
/// A submitted request maps to some sequence of responses; whether
/// `Responses` is a single value, an iterator or an async stream is the
/// implementor's choice, as is serialization and framing.
pub trait SubmitQuery {
    /// Request type of the query protocol.
    type Request;
    /// Response type of the query protocol.
    type Response;
    /// The shape one request's responses arrive in (for example
    /// `Vec<Self::Response>` or a stream of them).
    type Responses;

    /// Issue `request` over the client's channel.
    fn submit(
        &self,
        request: Self::Request,
    ) -> impl Future<Output = Result<Self::Responses>> + Send;
}

/// Owns one channel for the life of a client and shuts it down on demand.
#[derive(Debug)]
pub struct ClientCore {
    channel: Channel,
    shutdown_timeout: Duration,
}

impl ClientCore {
    /// Build the channel described by `config` and take ownership of it.
    ///
    /// Fails fatally on malformed parameters or security-material errors;
    /// a client that could not be constructed holds no resources.
    pub fn new(config: ChannelConfig) -> Result<Self> {
        let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
        let channel = Channel::build(&config)?;
        Ok(Self {
            channel,
            shutdown_timeout,
        })
    }

    /// Like [`new`](Self::new) but wrapping an already-built channel.
    pub fn from_channel(channel: Channel, shutdown_timeout: Duration) -> Self {
        Self {
            channel,
            shutdown_timeout,
        }
    }

    /// The channel this client issues calls over.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Shut the channel down, waiting up to the configured timeout for
    /// in-flight calls to drain.
    ///
    /// Never fails and never blocks past the timeout: a drain timeout is
    /// reported as a warning and the channel is closed anyway. Calling
    /// `close` on an already closing or closed client is a no-op.
    pub async fn close(&self) {
        if self.channel.state() != ChannelState::Open {
            tracing::debug!("close() on a channel that is already shutting down; ignoring");
            return;
        }

        let graceful = self.channel.shutdown(self.shutdown_timeout).await;
        if !graceful {
            tracing::warn!(
                host = %self.channel.host(),
                port = self.channel.port(),
                timeout_secs = self.shutdown_timeout.as_secs(),
                "timed out waiting for channel termination; forcing close"
            );
        }
    }
}
