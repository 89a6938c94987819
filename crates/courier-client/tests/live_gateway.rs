//! End-to-end flow against a real server on a loopback socket: REST auth,
//! a live gateway subscription, push delivery, and state reconciliation.

use std::sync::Arc;
use std::time::Duration;

use courier_api::auth::AppStateInner;
use courier_api::routes::build_router;
use courier_client::gateway::gateway_url;
use courier_client::{ApiClient, ChatState, GatewaySubscription};
use courier_db::Database;
use courier_gateway::dispatcher::Dispatcher;
use courier_types::events::{GatewayCommand, GatewayEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite};

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_server() -> String {
    let db = Database::open_in_memory().unwrap();
    let state = Arc::new(AppStateInner {
        db,
        dispatcher: Dispatcher::new(),
        jwt_secret: "test-secret".into(),
    });
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Waits for the next event matching `pred`, skipping unrelated traffic
/// (presence broadcasts race the targeted replies, so exact ordering
/// between the two streams is not asserted here).
async fn wait_for(
    sub: &mut GatewaySubscription,
    mut pred: impl FnMut(&GatewayEvent) -> bool,
) -> GatewayEvent {
    timeout(WAIT, async {
        loop {
            let event = sub
                .next_event()
                .await
                .unwrap()
                .expect("gateway closed while waiting for an event");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for a gateway event")
}

#[tokio::test]
async fn end_to_end_chat_over_a_real_socket() {
    let base = spawn_server().await;

    let mut ada = ApiClient::new(&base);
    let ada_user = ada
        .signup("ada@example.com", "Ada", "correct-horse-battery", None)
        .await
        .unwrap();
    let mut bob = ApiClient::new(&base);
    let bob_user = bob
        .signup("bob@example.com", "Bob", "correct-horse-battery", Some("bass player"))
        .await
        .unwrap();

    // Bob comes online and seeds his chat state.
    let mut sub = GatewaySubscription::connect(&base, bob.token().unwrap())
        .await
        .unwrap();
    let mut state = ChatState::new(bob_user.id);

    let ready = wait_for(&mut sub, |e| matches!(e, GatewayEvent::Ready { .. })).await;
    match ready {
        GatewayEvent::Ready { user_id } => assert_eq!(user_id, bob_user.id),
        _ => unreachable!(),
    }

    let snapshot = wait_for(&mut sub, |e| {
        matches!(e, GatewayEvent::OnlineUsersSnapshot { .. })
    })
    .await;
    state.apply_event(snapshot);
    assert!(state.is_online(bob_user.id));

    let directory = bob.list_users().await.unwrap();
    state.set_users(directory.users, directory.unseen_counts);
    assert_eq!(state.users().len(), 1);
    assert_eq!(state.users()[0].id, ada_user.id);
    assert_eq!(state.users()[0].display_name, "Ada");

    // Ada sends while Bob has no conversation open: badge, no append.
    let sent = ada
        .send_message(bob_user.id, Some("hello bob"), None)
        .await
        .unwrap();
    let push = wait_for(&mut sub, |e| matches!(e, GatewayEvent::NewMessage { .. })).await;
    let hint = state.apply_event(push);
    assert_eq!(hint, None);
    assert_eq!(state.unseen_count(ada_user.id), 1);
    assert!(state.messages().is_empty());

    // Bob opens the conversation: full history, already seen server-side.
    let history = bob.fetch_conversation(ada_user.id, None, None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, sent.id);
    assert_eq!(history[0].body.as_deref(), Some("hello bob"));
    assert!(history[0].seen);
    state.open_conversation(ada_user.id, history);
    assert_eq!(state.unseen_count(ada_user.id), 0);

    // The next push lands straight in the open conversation and asks us
    // to confirm it read.
    ada.send_message(bob_user.id, Some("you there?"), None)
        .await
        .unwrap();
    let push = wait_for(&mut sub, |e| matches!(e, GatewayEvent::NewMessage { .. })).await;
    let hint = state.apply_event(push);
    assert_eq!(hint, Some(ada_user.id));
    assert_eq!(state.messages().len(), 2);
    assert_eq!(bob.mark_read(ada_user.id).await.unwrap(), 1);

    // Bob replies; Ada reconciles by fetch even though she never opened a
    // gateway connection.
    let reply = bob
        .send_message(ada_user.id, Some("here"), None)
        .await
        .unwrap();
    state.record_sent(reply);
    assert_eq!(state.messages().len(), 3);

    let ada_view = ada.fetch_conversation(bob_user.id, None, None).await.unwrap();
    assert_eq!(ada_view.len(), 3);
    assert_eq!(ada_view[2].body.as_deref(), Some("here"));

    sub.close().await.unwrap();
}

#[tokio::test]
async fn disconnect_drops_the_user_from_presence() {
    let base = spawn_server().await;

    let mut ada = ApiClient::new(&base);
    let ada_user = ada
        .signup("ada@example.com", "Ada", "correct-horse-battery", None)
        .await
        .unwrap();
    let mut bob = ApiClient::new(&base);
    bob.signup("bob@example.com", "Bob", "correct-horse-battery", None)
        .await
        .unwrap();

    // Bob watches presence while Ada connects and disconnects.
    let mut watcher = GatewaySubscription::connect(&base, bob.token().unwrap())
        .await
        .unwrap();

    let ada_sub = GatewaySubscription::connect(&base, ada.token().unwrap())
        .await
        .unwrap();
    wait_for(&mut watcher, |e| {
        matches!(e, GatewayEvent::PresenceDelta { user_id, online: true } if *user_id == ada_user.id)
    })
    .await;

    ada_sub.close().await.unwrap();
    wait_for(&mut watcher, |e| {
        matches!(e, GatewayEvent::PresenceDelta { user_id, online: false } if *user_id == ada_user.id)
    })
    .await;

    let snapshot = wait_for(&mut watcher, |e| {
        matches!(e, GatewayEvent::OnlineUsersSnapshot { .. })
    })
    .await;
    match snapshot {
        GatewayEvent::OnlineUsersSnapshot { user_ids } => {
            assert!(!user_ids.contains(&ada_user.id));
        }
        _ => unreachable!(),
    }

    watcher.close().await.unwrap();
}

#[tokio::test]
async fn gateway_upgrade_rejects_bad_tokens() {
    let base = spawn_server().await;

    // An invalid token is refused at the handshake, before any presence
    // registration.
    let err = GatewaySubscription::connect(&base, "garbage")
        .await
        .unwrap_err();
    match err {
        courier_client::ClientError::Gateway(tungstenite::Error::Http(resp)) => {
            assert_eq!(resp.status(), 401);
        }
        other => panic!("expected an http 401 from the upgrade, got {other:?}"),
    }

    // A real token upgrades and is greeted with ready.
    let mut ada = ApiClient::new(&base);
    let ada_user = ada
        .signup("ada@example.com", "Ada", "correct-horse-battery", None)
        .await
        .unwrap();
    let mut sub = GatewaySubscription::connect(&base, ada.token().unwrap())
        .await
        .unwrap();
    let ready = wait_for(&mut sub, |e| matches!(e, GatewayEvent::Ready { .. })).await;
    match ready {
        GatewayEvent::Ready { user_id } => assert_eq!(user_id, ada_user.id),
        _ => unreachable!(),
    }
    sub.close().await.unwrap();
}

#[tokio::test]
async fn malformed_gateway_frames_are_logged_and_skipped() {
    // The bad-command warn path only renders when a subscriber wants it,
    // so install one scoped to the gateway before the server starts.
    let _ = tracing_subscriber::fmt()
        .with_env_filter("courier_gateway=warn")
        .try_init();

    let base = spawn_server().await;
    let mut ada = ApiClient::new(&base);
    ada.signup("ada@example.com", "Ada", "correct-horse-battery", None)
        .await
        .unwrap();

    let url = gateway_url(&base, ada.token().unwrap());
    let (mut stream, _) = connect_async(&url).await.unwrap();

    // 199 one-byte chars, then a two-byte char astride the 200-byte mark,
    // then enough tail to overrun it.
    let mut junk = "x".repeat(199);
    junk.push('é');
    junk.push_str(&"y".repeat(50));
    stream
        .send(tungstenite::Message::Text(junk.into()))
        .await
        .unwrap();

    // The connection must still answer commands afterwards. Registration
    // already broadcast one snapshot to this socket, so wait for the
    // second, which only exists if the reader lived past the junk.
    let cmd = serde_json::to_string(&GatewayCommand::RequestOnlineUsers).unwrap();
    stream
        .send(tungstenite::Message::Text(cmd.into()))
        .await
        .unwrap();

    let survived = timeout(WAIT, async {
        let mut snapshots = 0;
        while let Some(frame) = stream.next().await {
            if let Ok(tungstenite::Message::Text(text)) = frame {
                if let Ok(GatewayEvent::OnlineUsersSnapshot { .. }) = serde_json::from_str(&text)
                {
                    snapshots += 1;
                    if snapshots == 2 {
                        return true;
                    }
                }
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    assert!(survived, "connection did not survive the malformed frame");

    stream.close(None).await.unwrap();
}

#[tokio::test]
async fn auth_token_round_trips_through_login() {
    let base = spawn_server().await;

    let mut client = ApiClient::new(&base);
    let created = client
        .signup("ada@example.com", "Ada", "correct-horse-battery", None)
        .await
        .unwrap();

    let mut fresh = ApiClient::new(&base);
    let logged_in = fresh
        .login("ada@example.com", "correct-horse-battery")
        .await
        .unwrap();
    assert_eq!(logged_in.id, created.id);

    let checked = fresh.check_auth().await.unwrap();
    assert_eq!(checked.id, created.id);

    // A rejected call carries the server's message and leaves no token.
    let mut wrong = ApiClient::new(&base);
    let err = wrong
        .login("ada@example.com", "not-the-password")
        .await
        .unwrap_err();
    match err {
        courier_client::ClientError::Api { status, message } => {
            assert_eq!(status, 401);
            assert!(!message.is_empty());
        }
        other => panic!("expected an api error, got {other:?}"),
    }
    assert!(wrong.token().is_none());
}
