//! Listener lifecycle.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::router;
use crate::error::Result;
use crate::executor::TableService;

/// Serve the API on `addr` until `shutdown` is cancelled, then drain
/// in-flight requests.
pub async fn serve(service: Arc<TableService>, addr: &str, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Table API listening on {}", listener.local_addr()?);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::FakeDatabase;
    use crate::executor::Limits;
    use std::time::Duration;

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let service = Arc::new(TableService::new(
            Arc::new(FakeDatabase::new()),
            "dbo",
            Limits::default(),
        ));
        let token = CancellationToken::new();
        let handle = tokio::spawn(serve(service, "127.0.0.1:0", token.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
