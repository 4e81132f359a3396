//! Liveness and shutdown probing.
//!
//! A probe is a short-lived client connection against an endpoint, used by
//! external tooling to answer "is a server listening?" and, optionally, to
//! run a graceful-shutdown handshake. A refused or timed-out connection is
//! the liveness-negative answer, never an application error, and a probe
//! never blocks past its deadline.
//!
//! The handshake itself belongs to the request protocol, which is out of
//! scope here: [`probe_and_shutdown`] runs a caller-supplied future over
//! the live stream and only classifies the outcome.

use std::future::Future;
use std::time::Duration;

use crate::endpoint::EndpointName;
use crate::transport::ServerStream;

/// Outcome of one probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// No connection could be established within the deadline.
    NoServerListening,
    /// A connection was established; no handshake was performed (or the
    /// handshake failed after the channel was open).
    ServerListening,
    /// A connection was established and the shutdown handshake completed.
    ServerListeningAndShutdownAcknowledged,
}

impl ProbeResult {
    /// Whether a server was reachable at all.
    pub fn is_listening(&self) -> bool {
        !matches!(self, ProbeResult::NoServerListening)
    }
}

/// Test whether a server is listening on the endpoint.
///
/// Connection refusal, absence of the endpoint, timeout, and cancellation
/// of the in-flight attempt all classify as
/// [`ProbeResult::NoServerListening`].
pub async fn probe(endpoint: &EndpointName, timeout: Duration) -> ProbeResult {
    match ServerStream::connect(endpoint, timeout).await {
        Ok(_stream) => ProbeResult::ServerListening,
        Err(e) => {
            tracing::debug!(endpoint = %endpoint, error = %e, "probe: no server listening");
            ProbeResult::NoServerListening
        }
    }
}

/// Probe the endpoint and, if a server answers, run the shutdown handshake
/// over the live stream.
///
/// `handshake` carries whatever the request protocol requires; its success
/// upgrades the result to
/// [`ProbeResult::ServerListeningAndShutdownAcknowledged`], while its
/// failure leaves the result at [`ProbeResult::ServerListening`], since the
/// channel existed even though the server never acknowledged.
pub async fn probe_and_shutdown<H, Fut>(
    endpoint: &EndpointName,
    timeout: Duration,
    handshake: H,
) -> ProbeResult
where
    H: FnOnce(ServerStream) -> Fut,
    Fut: Future<Output = crate::Result<()>>,
{
    let stream = match ServerStream::connect(endpoint, timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(endpoint = %endpoint, error = %e, "probe: no server listening");
            return ProbeResult::NoServerListening;
        }
    };

    match handshake(stream).await {
        Ok(()) => ProbeResult::ServerListeningAndShutdownAcknowledged,
        Err(e) => {
            tracing::warn!(endpoint = %endpoint, error = %e, "shutdown handshake not acknowledged");
            ProbeResult::ServerListening
        }
    }
}
