//! Server startup and lifecycle.
//!
//! [`run_server`] is the single startup path for a server process:
//!
//! 1. Acquire the singleton lease (abort with a distinct code on contention)
//! 2. Bind the listening transport
//! 3. Resolve the keep-alive policy
//! 4. Hand control to the externally supplied [`Dispatcher`]
//! 5. Release the lease, only after the dispatcher has returned
//!
//! The dispatcher owns the accept/serve loop, the request protocol, and
//! keep-alive enforcement; its return value becomes the process exit code.
//! The lease is held for the dispatcher's full lifetime on every exit path,
//! so there is no window where the mutex is free while the transport still
//! listens.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::oneshot;

use crate::endpoint::EndpointName;
use crate::error::Result;
use crate::keepalive::{KeepAliveSetting, ServerConfig};
use crate::lease::SingletonLease;
use crate::transport::ServerListener;

/// Process exit codes for server startup.
///
/// Calling tooling distinguishes "fine, someone else is serving" from
/// "something is broken" by these values; they are stable.
pub mod exit_code {
    /// Generic fatal startup failure.
    pub const STARTUP_FAILED: i32 = 1;
    /// Another server already owns the endpoint.
    pub const ALREADY_RUNNING: i32 = 3;
}

/// Boxed future returned by dispatcher implementations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The externally supplied serve loop.
///
/// Invoked exactly once per successful lease acquisition. The dispatcher
/// accepts connections on the listener, enforces `keep_alive`, stops
/// accepting when `shutdown` fires, and returns the process exit code.
pub trait Dispatcher: Send + 'static {
    /// Serve connections until keep-alive expiry, explicit shutdown, or a
    /// fatal error.
    fn serve(
        self,
        listener: ServerListener,
        keep_alive: KeepAliveSetting,
        shutdown: oneshot::Receiver<()>,
    ) -> BoxFuture<'static, i32>;
}

impl<F> Dispatcher for F
where
    F: FnOnce(ServerListener, KeepAliveSetting, oneshot::Receiver<()>) -> BoxFuture<'static, i32>
        + Send
        + 'static,
{
    fn serve(
        self,
        listener: ServerListener,
        keep_alive: KeepAliveSetting,
        shutdown: oneshot::Receiver<()>,
    ) -> BoxFuture<'static, i32> {
        self(listener, keep_alive, shutdown)
    }
}

/// Start a server for the endpoint and run it to completion.
///
/// Returns the dispatcher's exit code, or [`exit_code::ALREADY_RUNNING`]
/// when another process holds the endpoint's lease. In that case nothing
/// is created and nothing is logged as an error, since a running server is
/// the expected frequent outcome. Any other startup failure is returned as
/// an error for the embedding binary to map to
/// [`exit_code::STARTUP_FAILED`].
pub async fn run_server<D: Dispatcher>(
    endpoint: &EndpointName,
    config: &ServerConfig,
    dispatcher: D,
    shutdown: oneshot::Receiver<()>,
) -> Result<i32> {
    // 1. Singleton lease first: on contention, abort before any resource
    //    is created.
    let lease = match SingletonLease::try_acquire(endpoint) {
        Ok(lease) => lease,
        Err(e) if e.is_contention() => {
            tracing::debug!(endpoint = %endpoint, "another server is already listening");
            return Ok(exit_code::ALREADY_RUNNING);
        }
        Err(e) => {
            tracing::error!(endpoint = %endpoint, error = %e, "lease acquisition failed");
            return Err(e);
        }
    };

    // 2. Build the listening transport. On failure the lease drops here,
    //    releasing the endpoint.
    let listener = match ServerListener::bind(endpoint).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(endpoint = %endpoint, error = %e, "transport construction failed");
            return Err(e);
        }
    };

    // 3. Resolve keep-alive once; enforcement is the dispatcher's job.
    let keep_alive = KeepAliveSetting::resolve(config);
    tracing::debug!(endpoint = %endpoint, ?keep_alive, "server starting");

    // 4. Hand control to the dispatcher for the serving lifetime.
    let code = dispatcher.serve(listener, keep_alive, shutdown).await;

    // 5. Release the lease only after the dispatcher has fully stopped.
    drop(lease);
    tracing::debug!(endpoint = %endpoint, code, "server stopped");

    Ok(code)
}
