use reqwest::Client;
use std::time::Duration;
use tracing::warn;

/// One long-lived client per upstream service; each carries its own request bound.
pub fn build_client(timeout: Duration, connect_timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .build()
        .unwrap_or_else(|err| {
            warn!(
                target: "itemlens.http",
                error = %err,
                "http client builder failed; falling back to a client without timeouts"
            );
            Client::new()
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::Router;

    /// Serves `router` on an ephemeral local port and returns its base URL.
    pub(crate) async fn serve_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }
}
