//! # buildserver
//!
//! Lifecycle core for a persistent, out-of-process compile server: a
//! background process that accepts compile requests over an inter-process
//! channel so repeated compiler invocations avoid repaying startup and
//! warm-up costs.
//!
//! This crate owns startup, singleton enforcement, transport selection,
//! keep-alive resolution, and liveness probing. The request protocol, the
//! accept loop, and compiler invocation belong to an externally supplied
//! [`Dispatcher`].
//!
//! ## Architecture
//!
//! - **Endpoint naming**: deterministic name per toolset installation
//! - **Transport**: named pipe (Windows) or Unix domain socket (elsewhere),
//!   selected statically per platform
//! - **Singleton lease**: OS-level exclusive lock, one server per endpoint
//! - **Keep-alive**: idle lifetime resolved once from configuration
//! - **Probe**: short-lived client connect for status and shutdown requests
//!
//! ## Example
//!
//! ```ignore
//! use buildserver::{run_server, EndpointName, ServerConfig};
//! use std::path::Path;
//! use tokio::sync::oneshot;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let endpoint = EndpointName::from_toolset_dir(Path::new("/opt/toolset"));
//!     let (_shutdown_tx, shutdown_rx) = oneshot::channel();
//!
//!     match run_server(&endpoint, &ServerConfig::from_env(), MyDispatcher, shutdown_rx).await {
//!         Ok(code) => std::process::ExitCode::from(code as u8),
//!         Err(_) => std::process::ExitCode::from(buildserver::exit_code::STARTUP_FAILED as u8),
//!     }
//! }
//! ```

pub mod controller;
pub mod endpoint;
pub mod error;
pub mod keepalive;
pub mod lease;
pub mod probe;
pub mod transport;

pub use controller::{exit_code, run_server, BoxFuture, Dispatcher};
pub use endpoint::EndpointName;
pub use error::{Result, ServerError};
pub use keepalive::{KeepAliveSetting, ServerConfig, KEEPALIVE_ENV_VAR};
pub use lease::{LeaseInfo, SingletonLease};
pub use probe::{probe, probe_and_shutdown, ProbeResult};
pub use transport::{ServerListener, ServerStream};
