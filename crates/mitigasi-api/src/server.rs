//! HTTP server lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::hub::BroadcastHub;

/// Errors that can occur when starting or running a server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Bind `addr` and serve `router` until `Ctrl-C`.
///
/// `addr` is a `host:port` string such as `0.0.0.0:8080`. `hub` is the
/// router's broadcast hub; it is closed on shutdown.
pub async fn start_server(
    addr: &str,
    router: Router,
    hub: Arc<BroadcastHub>,
) -> Result<(), ServerError> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| ServerError::Bind(format!("invalid address {addr}: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "HTTP server listening");
    serve(listener, router, hub, shutdown_signal()).await
}

/// Serve `router` on a bound listener until `signal` resolves.
///
/// When it does, `hub` is closed so open broadcast streams end and the
/// graceful shutdown can finish.
pub async fn serve<F>(
    listener: TcpListener,
    router: Router,
    hub: Arc<BroadcastHub>,
    signal: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal.await;
            hub.close();
        })
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use mitigasi_db::{AggregateBackend, MemoryAggregateStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    use super::*;
    use crate::router::city_router;
    use crate::state::CityState;

    #[tokio::test]
    async fn invalid_address_is_a_bind_error() {
        let hub = Arc::new(BroadcastHub::new());
        let result = start_server("not-an-address", Router::new(), hub).await;
        assert!(matches!(result, Err(ServerError::Bind(_))));
    }

    #[tokio::test]
    async fn shutdown_completes_with_an_open_stream() {
        let hub = Arc::new(BroadcastHub::new());
        let store = AggregateBackend::Memory(MemoryAggregateStore::new());
        let router = city_router(CityState::new(store, Arc::clone(&hub)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, router, Arc::clone(&hub), async move {
            let _ = stopped.await;
        }));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /api/v1/broadcast/stream HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0_u8; 1024];
        let read = client.read(&mut buf).await.unwrap();
        assert!(read > 0);
        assert_eq!(hub.client_count(), 1);

        stop.send(()).unwrap();
        let finished = tokio::time::timeout(Duration::from_secs(3), server).await;
        assert!(matches!(finished, Ok(Ok(Ok(())))));
        assert_eq!(hub.client_count(), 0);
    }
}
