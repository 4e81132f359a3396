//! Platform-specific listener/stream implementation.
//!
//! - Unix: Unix Domain Socket bound to the endpoint's socket path
//! - Windows: Named Pipe bound to the endpoint's pipe name
//!
//! The variant is selected once, statically, by the target platform; a
//! process never constructs the other family's transport. Client and server
//! sides derive the concrete resource from the same [`EndpointName`], so a
//! probe always dials what the server actually listens on.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::endpoint::EndpointName;
use crate::error::{Result, ServerError};

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use tokio::net::{UnixListener, UnixStream};

    /// Unix Domain Socket listener.
    pub struct ServerListener {
        listener: UnixListener,
        path: std::path::PathBuf,
    }

    /// Unix Domain Socket stream (connected).
    pub struct ServerStream {
        stream: UnixStream,
    }

    impl ServerListener {
        /// Bind to the endpoint's socket path.
        ///
        /// A socket file left behind by a crashed server is removed before
        /// binding; the singleton lease, not the socket file, decides
        /// whether a server is running.
        pub async fn bind(endpoint: &EndpointName) -> Result<Self> {
            let path = endpoint.socket_path();

            if path.exists() {
                tracing::warn!(path = %path.display(), "removing stale socket file");
                std::fs::remove_file(&path)?;
            }

            let listener = UnixListener::bind(&path)?;
            tracing::debug!(endpoint = %endpoint, path = %path.display(), "listening");

            Ok(Self { listener, path })
        }

        /// Accept a single connection.
        pub async fn accept(&self) -> Result<ServerStream> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(ServerStream { stream })
        }

        /// The socket path this listener is bound to.
        pub fn local_name(&self) -> String {
            self.path.display().to_string()
        }
    }

    impl Drop for ServerListener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    impl ServerStream {
        /// Connect to the endpoint's socket path, bounded by `timeout`.
        pub async fn connect(endpoint: &EndpointName, timeout: Duration) -> Result<Self> {
            let path = endpoint.socket_path();
            match tokio::time::timeout(timeout, UnixStream::connect(&path)).await {
                Ok(Ok(stream)) => Ok(ServerStream { stream }),
                Ok(Err(e)) => Err(ServerError::Io(e)),
                Err(_) => Err(ServerError::ConnectTimeout(timeout)),
            }
        }
    }

    impl AsyncRead for ServerStream {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for ServerStream {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::pin::Pin::new(&mut self.stream).poll_write(cx, buf)
        }

        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_shutdown(cx)
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, ServerOptions};
    use tokio::sync::Mutex;

    /// `ERROR_PIPE_BUSY`: all pipe instances are busy, retry later.
    const ERROR_PIPE_BUSY: i32 = 231;

    /// How long to back off before redialing a busy pipe.
    const BUSY_RETRY_INTERVAL: Duration = Duration::from_millis(50);

    /// Windows Named Pipe listener.
    ///
    /// The first pipe instance is created at bind time so that contention
    /// on the name surfaces immediately; `accept` consumes it and creates
    /// follow-up instances on demand.
    pub struct ServerListener {
        pipe_name: String,
        pending: Mutex<Option<NamedPipeServer>>,
    }

    /// Windows Named Pipe stream (connected).
    pub struct ServerStream {
        pipe: PipeEnd,
    }

    enum PipeEnd {
        Server(NamedPipeServer),
        Client(tokio::net::windows::named_pipe::NamedPipeClient),
    }

    impl ServerListener {
        /// Create the named pipe server for the endpoint.
        pub async fn bind(endpoint: &EndpointName) -> Result<Self> {
            let pipe_name = endpoint.pipe_name();

            let first = ServerOptions::new()
                .first_pipe_instance(true)
                .create(&pipe_name)?;
            tracing::debug!(endpoint = %endpoint, pipe = %pipe_name, "listening");

            Ok(Self {
                pipe_name,
                pending: Mutex::new(Some(first)),
            })
        }

        /// Accept a single connection.
        pub async fn accept(&self) -> Result<ServerStream> {
            let server = match self.pending.lock().await.take() {
                Some(instance) => instance,
                None => ServerOptions::new()
                    .first_pipe_instance(false)
                    .create(&self.pipe_name)?,
            };

            server.connect().await?;
            Ok(ServerStream {
                pipe: PipeEnd::Server(server),
            })
        }

        /// The pipe name this listener is bound to.
        pub fn local_name(&self) -> String {
            self.pipe_name.clone()
        }
    }

    impl ServerStream {
        /// Connect to the endpoint's named pipe, bounded by `timeout`.
        ///
        /// A busy pipe (`ERROR_PIPE_BUSY`) is redialed until the deadline;
        /// any other failure is returned as-is.
        pub async fn connect(endpoint: &EndpointName, timeout: Duration) -> Result<Self> {
            let pipe_name = endpoint.pipe_name();
            let deadline = tokio::time::Instant::now() + timeout;

            loop {
                match ClientOptions::new().open(&pipe_name) {
                    Ok(client) => {
                        return Ok(ServerStream {
                            pipe: PipeEnd::Client(client),
                        })
                    }
                    Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                        if tokio::time::Instant::now() + BUSY_RETRY_INTERVAL >= deadline {
                            return Err(ServerError::ConnectTimeout(timeout));
                        }
                        tokio::time::sleep(BUSY_RETRY_INTERVAL).await;
                    }
                    Err(e) => return Err(ServerError::Io(e)),
                }
            }
        }
    }

    impl AsyncRead for ServerStream {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match &mut self.pipe {
                PipeEnd::Server(p) => std::pin::Pin::new(p).poll_read(cx, buf),
                PipeEnd::Client(p) => std::pin::Pin::new(p).poll_read(cx, buf),
            }
        }
    }

    impl AsyncWrite for ServerStream {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            match &mut self.pipe {
                PipeEnd::Server(p) => std::pin::Pin::new(p).poll_write(cx, buf),
                PipeEnd::Client(p) => std::pin::Pin::new(p).poll_write(cx, buf),
            }
        }

        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match &mut self.pipe {
                PipeEnd::Server(p) => std::pin::Pin::new(p).poll_flush(cx),
                PipeEnd::Client(p) => std::pin::Pin::new(p).poll_flush(cx),
            }
        }

        fn poll_shutdown(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match &mut self.pipe {
                PipeEnd::Server(p) => std::pin::Pin::new(p).poll_shutdown(cx),
                PipeEnd::Client(p) => std::pin::Pin::new(p).poll_shutdown(cx),
            }
        }
    }
}

// ============================================================================
// Platform-independent re-exports
// ============================================================================

#[cfg(unix)]
pub use unix_impl::{ServerListener, ServerStream};

#[cfg(windows)]
pub use windows_impl::{ServerListener, ServerStream};
