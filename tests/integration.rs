//! Integration tests for the server lifecycle core.
//!
//! These tests exercise the full startup path: lease acquisition, transport
//! construction, dispatcher hand-off, probing, and release.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;

use buildserver::{
    exit_code, probe, probe_and_shutdown, run_server, BoxFuture, Dispatcher, EndpointName,
    KeepAliveSetting, ProbeResult, ServerConfig, ServerListener, ServerStream, SingletonLease,
};

fn test_endpoint(dir: &tempfile::TempDir) -> EndpointName {
    EndpointName::from_toolset_dir(dir.path())
}

/// Connect to a server that is still starting up. A plain connect fails
/// immediately while the listener is not yet bound, so retry until the
/// deadline.
async fn connect_within(endpoint: &EndpointName, deadline: Duration) -> ServerStream {
    let started = std::time::Instant::now();
    loop {
        match ServerStream::connect(endpoint, Duration::from_millis(250)).await {
            Ok(stream) => return stream,
            Err(_) if started.elapsed() < deadline => {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(e) => panic!("server did not start listening: {e}"),
        }
    }
}

/// One-shot dispatcher: accepts a single connection, answers a fixed-size
/// request with its uppercased bytes, then exits.
struct OneShotUpper;

impl Dispatcher for OneShotUpper {
    fn serve(
        self,
        listener: ServerListener,
        keep_alive: KeepAliveSetting,
        _shutdown: oneshot::Receiver<()>,
    ) -> BoxFuture<'static, i32> {
        Box::pin(async move {
            assert!(keep_alive.is_one_shot());

            let mut stream = match listener.accept().await {
                Ok(stream) => stream,
                Err(_) => return exit_code::STARTUP_FAILED,
            };

            let mut buf = [0u8; 7];
            if stream.read_exact(&mut buf).await.is_err() {
                return exit_code::STARTUP_FAILED;
            }
            buf.make_ascii_uppercase();
            if stream.write_all(&buf).await.is_err() {
                return exit_code::STARTUP_FAILED;
            }
            0
        })
    }
}

/// Full one-shot server lifecycle: acquire, serve one connection, exit with
/// the dispatcher's code, release, and allow immediate reacquisition.
#[tokio::test]
async fn test_one_shot_server_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = test_endpoint(&dir);
    let config = ServerConfig {
        keepalive: Some("0".to_string()),
    };

    let (_shutdown_tx, shutdown_rx) = oneshot::channel();
    let server = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move { run_server(&endpoint, &config, OneShotUpper, shutdown_rx).await })
    };

    // While the server is up, the endpoint is both held and reachable.
    let mut client = connect_within(&endpoint, Duration::from_secs(5)).await;
    assert!(SingletonLease::is_held_elsewhere(&endpoint).unwrap());

    client.write_all(b"compile").await.unwrap();
    let mut reply = [0u8; 7];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"COMPILE");

    let code = server.await.unwrap().unwrap();
    assert_eq!(code, 0);

    // Release is complete: a fresh acquisition succeeds immediately and the
    // endpoint no longer answers.
    let lease = SingletonLease::try_acquire(&endpoint).unwrap();
    drop(lease);
    assert_eq!(
        probe(&endpoint, Duration::from_millis(500)).await,
        ProbeResult::NoServerListening
    );
}

/// A second server started against a live endpoint aborts with the
/// dedicated exit code and disturbs nothing.
#[tokio::test]
async fn test_second_server_aborts_while_first_is_serving() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = test_endpoint(&dir);
    let config = ServerConfig {
        keepalive: Some("0".to_string()),
    };

    let (_shutdown_tx, shutdown_rx) = oneshot::channel();
    let server = {
        let endpoint = endpoint.clone();
        let config = config.clone();
        tokio::spawn(async move { run_server(&endpoint, &config, OneShotUpper, shutdown_rx).await })
    };

    // Wait for the first server to listen before racing it.
    let mut client = connect_within(&endpoint, Duration::from_secs(5)).await;

    let (_tx2, rx2) = oneshot::channel();
    let code = run_server(&endpoint, &config, OneShotUpper, rx2)
        .await
        .unwrap();
    assert_eq!(code, exit_code::ALREADY_RUNNING);

    // The first server is unaffected and still serves its connection.
    client.write_all(b"compile").await.unwrap();
    let mut reply = [0u8; 7];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"COMPILE");

    assert_eq!(server.await.unwrap().unwrap(), 0);
}

/// Probe classification across the endpoint's whole lifecycle.
#[tokio::test]
async fn test_probe_tracks_server_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = test_endpoint(&dir);

    // Nothing started yet.
    assert_eq!(
        probe(&endpoint, Duration::from_millis(500)).await,
        ProbeResult::NoServerListening
    );
    assert!(!SingletonLease::is_held_elsewhere(&endpoint).unwrap());

    // Shutdown-capable dispatcher: keeps accepting until one client
    // completes the one-byte handshake. Probes that only test liveness hang
    // up without sending anything; those are tolerated, not fatal.
    let dispatcher = |listener: ServerListener,
                      _keep_alive: KeepAliveSetting,
                      _shutdown: oneshot::Receiver<()>|
     -> BoxFuture<'static, i32> {
        Box::pin(async move {
            loop {
                let mut stream = match listener.accept().await {
                    Ok(stream) => stream,
                    Err(_) => return exit_code::STARTUP_FAILED,
                };
                let mut req = [0u8; 1];
                if stream.read_exact(&mut req).await.is_err() {
                    continue;
                }
                if stream.write_all(b"+").await.is_err() {
                    continue;
                }
                return 0;
            }
        })
    };

    let (_shutdown_tx, shutdown_rx) = oneshot::channel();
    let server = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            run_server(&endpoint, &ServerConfig::default(), dispatcher, shutdown_rx).await
        })
    };

    // Wait until the endpoint answers probes at all.
    let started = std::time::Instant::now();
    while !probe(&endpoint, Duration::from_millis(250)).await.is_listening() {
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "server did not start listening"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The handshake completes, so the probe reports the acknowledgment.
    let result = probe_and_shutdown(&endpoint, Duration::from_secs(5), |mut stream| async move {
        stream.write_all(b"!").await?;
        stream.flush().await?;
        let mut ack = [0u8; 1];
        stream.read_exact(&mut ack).await?;
        Ok(())
    })
    .await;
    assert_eq!(result, ProbeResult::ServerListeningAndShutdownAcknowledged);

    assert_eq!(server.await.unwrap().unwrap(), 0);

    // Back to square one.
    assert_eq!(
        probe(&endpoint, Duration::from_millis(500)).await,
        ProbeResult::NoServerListening
    );
    assert!(!SingletonLease::is_held_elsewhere(&endpoint).unwrap());
}

/// The environment loader feeds the same resolution path as an explicit
/// record.
#[test]
fn test_config_from_env_round_trip() {
    // This is the only test in this binary touching the variable, so no
    // serialization against other tests is needed.
    std::env::set_var(buildserver::KEEPALIVE_ENV_VAR, "600");
    let config = ServerConfig::from_env();
    std::env::remove_var(buildserver::KEEPALIVE_ENV_VAR);

    assert_eq!(config.keepalive.as_deref(), Some("600"));
    assert_eq!(
        KeepAliveSetting::resolve(&config),
        KeepAliveSetting::Explicit(Duration::from_secs(600))
    );

    let config = ServerConfig::from_env();
    assert_eq!(KeepAliveSetting::resolve(&config), KeepAliveSetting::Default);
}
