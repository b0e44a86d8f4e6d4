//! Shared test harness: spins the broadcast server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use boardsync_core::config::realtime::RealtimeConfig;
use boardsync_server::app::build_app;
use boardsync_server::hub::BroadcastHub;

pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: Arc<BroadcastHub>,
}

impl TestServer {
    /// Binds an ephemeral port and serves the app in the background.
    pub async fn spawn() -> Self {
        let hub = Arc::new(BroadcastHub::new(RealtimeConfig::default()));
        let app = build_app(hub.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        Self { addr, hub }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}
