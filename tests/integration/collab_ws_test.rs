//! Integration tests for presence propagation and event fan-out.

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use boardsync_client::{ClientConfig, ClientIdentity, CollabClient, ConnectionState, EntitySession};
use boardsync_protocol::{EntityKind, EventKind, PresenceStatus, PresenceUser};

use crate::helpers::TestServer;

const WAIT: Duration = Duration::from_secs(5);

async fn wait_open(client: &CollabClient) {
    let mut state = client.state();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Open))
        .await
        .expect("connect timeout")
        .expect("state channel closed");
}

async fn wait_for_presence<F>(
    rx: &mut mpsc::UnboundedReceiver<Vec<PresenceUser>>,
    predicate: F,
) -> Vec<PresenceUser>
where
    F: Fn(&[PresenceUser]) -> bool,
{
    timeout(WAIT, async {
        loop {
            let users = rx.recv().await.expect("presence stream closed");
            if predicate(&users) {
                return users;
            }
        }
    })
    .await
    .expect("presence condition timeout")
}

#[tokio::test]
async fn presence_propagates_and_clears_on_disconnect() {
    let server = TestServer::spawn().await;

    let alice = CollabClient::new(
        ClientConfig::new(server.ws_url()),
        ClientIdentity::new("alice").with_name("Alice"),
    );
    alice.connect();
    wait_open(&alice).await;

    let bob = CollabClient::new(ClientConfig::new(server.ws_url()), ClientIdentity::new("bob"));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = bob.on_presence_change(move |users| {
        let _ = tx.send(users.to_vec());
    });
    bob.connect();
    wait_open(&bob).await;

    alice.set_current_view("/projects/42");

    let users = wait_for_presence(&mut rx, |users| {
        users
            .iter()
            .any(|u| u.id == "alice" && u.current_view == "/projects/42")
    })
    .await;
    let entry = users.iter().find(|u| u.id == "alice").expect("alice entry");
    assert_eq!(entry.name.as_deref(), Some("Alice"));
    assert_eq!(entry.status, PresenceStatus::Active);

    // Closing Alice's connection removes her from the list Bob sees.
    alice.disconnect();
    wait_for_presence(&mut rx, |users| users.iter().all(|u| u.id != "alice")).await;
}

#[tokio::test]
async fn collaboration_events_reach_every_client_including_the_sender() {
    let server = TestServer::spawn().await;

    let alice = CollabClient::new(
        ClientConfig::new(server.ws_url()),
        ClientIdentity::new("alice"),
    );
    let bob = CollabClient::new(ClientConfig::new(server.ws_url()), ClientIdentity::new("bob"));

    let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
    let _alice_sub = alice.on_collaboration_event("task-7", move |event| {
        let _ = alice_tx.send(event.clone());
    });
    let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
    let _bob_sub = bob.on_collaboration_event("task-7", move |event| {
        let _ = bob_tx.send(event.clone());
    });

    bob.connect();
    wait_open(&bob).await;

    let session = EntitySession::new(&alice, EntityKind::Task, "task-7");
    wait_open(&alice).await;
    session.send_edit("title", json!("Draft"), json!("Final"), None);

    for rx in [&mut alice_rx, &mut bob_rx] {
        let event = timeout(WAIT, rx.recv())
            .await
            .expect("event timeout")
            .expect("event stream closed");
        assert_eq!(event.kind, EventKind::Edit);
        assert_eq!(event.user_id, "alice");
        assert_eq!(event.entity_id, "task-7");
        assert_eq!(event.data["field"], "title");
        assert_eq!(event.data["newValue"], "Final");
    }
}

#[tokio::test]
async fn server_tracks_connection_and_presence_counts() {
    let server = TestServer::spawn().await;

    let alice = CollabClient::new(
        ClientConfig::new(server.ws_url()),
        ClientIdentity::new("alice"),
    );
    alice.connect();
    wait_open(&alice).await;

    timeout(WAIT, async {
        while server.hub.connection_count() != 1 || server.hub.presence_count() != 1 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("registration timeout");

    alice.disconnect();

    timeout(WAIT, async {
        while server.hub.connection_count() != 0 || server.hub.presence_count() != 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("cleanup timeout");
}
