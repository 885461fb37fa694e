//! Helpers for tests that need a real HTTP peer on localhost.

use std::net::SocketAddr;

use axum::Router;

/// Serve `app` on an ephemeral localhost port for the rest of the test
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}
