use std::time::Duration;

use cds::ConfigClient;
use cds::ConfigId;
use cds::SessionState;
use cds::CONNECTIONS_CLOSED;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::common::enable_logger;
use crate::common::fast_settings;
use crate::common::gateway;
use crate::common::recv_within;
use crate::common::start_server;
use crate::common::wait_for_subscribers;
use crate::common::Gateway;

#[tokio::test]
async fn test_watch_survives_server_restart() {
    enable_logger();
    let (server, addr, server_token) = start_server("127.0.0.1:0").await;
    let settings = fast_settings("127.0.0.1:0");
    let address = addr.to_string();

    let client1 = ConfigClient::<Gateway>::for_id(&address, "ns1/gw1", &settings).unwrap();
    let client2 = ConfigClient::<Gateway>::for_id(&address, "ns1/gw2", &settings).unwrap();
    let client3 = ConfigClient::<Gateway>::for_id(&address, "ns1/gw3", &settings).unwrap();

    let (tx1, mut rx1) = mpsc::channel(8);
    let (tx2, mut rx2) = mpsc::channel(8);
    let (tx3, mut rx3) = mpsc::channel(8);
    let client_token = CancellationToken::new();
    client1.watch(client_token.clone(), tx1).unwrap();
    client2.watch(client_token.clone(), tx2).unwrap();
    client3.watch(client_token.clone(), tx3).unwrap();

    // watch: no result
    assert!(recv_within(&mut rx1, Duration::from_millis(150)).await.is_none());
    assert!(recv_within(&mut rx2, Duration::from_millis(150)).await.is_none());
    assert!(recv_within(&mut rx3, Duration::from_millis(150)).await.is_none());

    let c1 = gateway("ns1/gw1", "realm1");
    let c2 = gateway("ns1/gw2", "realm1");
    server.update_config(vec![c1.clone(), c2.clone()]).unwrap();
    assert_eq!(server.snapshot().len(), 2);
    assert!(server.get(&ConfigId::new("ns1", "gw3")).is_none());

    assert_eq!(recv_within(&mut rx1, Duration::from_millis(500)).await, Some(c1));
    assert_eq!(recv_within(&mut rx2, Duration::from_millis(500)).await, Some(c2.clone()));
    assert!(recv_within(&mut rx3, Duration::from_millis(500)).await.is_none());

    // update conf 1 and add conf 3; conf 2 is resubmitted unchanged
    let c1 = gateway("ns1/gw1", "realm-new");
    let c3 = gateway("ns1/gw3", "realm3");
    server
        .update_config(vec![c1.clone(), c2.clone(), c3.clone()])
        .unwrap();
    assert_eq!(server.snapshot().len(), 3);

    assert_eq!(recv_within(&mut rx1, Duration::from_millis(500)).await, Some(c1.clone()));
    assert!(recv_within(&mut rx2, Duration::from_millis(500)).await.is_none());
    assert_eq!(recv_within(&mut rx3, Duration::from_millis(500)).await, Some(c3.clone()));

    // restart the server on the same address
    server_token.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let (server, restarted, server_token) = start_server(&address).await;
    assert_eq!(restarted, addr);
    server
        .update_config(vec![c1.clone(), c2.clone(), c3.clone()])
        .unwrap();

    // every watcher resyncs, even for unchanged values; this may take a while
    assert_eq!(recv_within(&mut rx1, Duration::from_secs(5)).await, Some(c1.clone()));
    assert_eq!(recv_within(&mut rx2, Duration::from_millis(500)).await, Some(c2));
    assert_eq!(recv_within(&mut rx3, Duration::from_millis(500)).await, Some(c3.clone()));

    // remove conf 2: removal is silent
    server.update_config(vec![c1, c3]).unwrap();
    assert_eq!(server.snapshot().len(), 2);
    assert!(server.get(&ConfigId::new("ns1", "gw2")).is_none());

    assert!(recv_within(&mut rx1, Duration::from_millis(50)).await.is_none());
    assert!(recv_within(&mut rx2, Duration::from_millis(50)).await.is_none());
    assert!(recv_within(&mut rx3, Duration::from_millis(50)).await.is_none());

    // remove the rest
    server.update_config(vec![]).unwrap();
    assert!(server.snapshot().is_empty());

    assert!(recv_within(&mut rx1, Duration::from_millis(10)).await.is_none());
    assert!(recv_within(&mut rx2, Duration::from_millis(10)).await.is_none());
    assert!(recv_within(&mut rx3, Duration::from_millis(10)).await.is_none());

    client_token.cancel();
    server_token.cancel();
}

#[tokio::test]
async fn test_watch_retries_until_server_appears() {
    // reserve a port, then free it for the server started later
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = probe.local_addr().unwrap().to_string();
    drop(probe);

    let settings = fast_settings("127.0.0.1:0");
    let client = ConfigClient::<Gateway>::for_id(&address, "ns1/gw1", &settings).unwrap();
    let mut state = client.state();
    let (tx, mut rx) = mpsc::channel(8);
    let client_token = CancellationToken::new();
    let handle = client.watch(client_token.clone(), tx).unwrap();

    assert!(recv_within(&mut rx, Duration::from_millis(400)).await.is_none());
    assert_ne!(*state.borrow(), SessionState::Synced);

    let (server, _, server_token) = start_server(&address).await;
    server
        .update_config(vec![gateway("ns1/gw1", "realm1")])
        .unwrap();

    assert_eq!(
        recv_within(&mut rx, Duration::from_secs(2)).await,
        Some(gateway("ns1/gw1", "realm1"))
    );
    tokio::time::timeout(
        Duration::from_secs(1),
        state.wait_for(|s| *s == SessionState::Synced),
    )
    .await
    .unwrap()
    .unwrap();

    client_token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    server_token.cancel();
}

#[tokio::test]
async fn test_server_unregisters_cancelled_watchers() {
    let (server, addr, server_token) = start_server("127.0.0.1:0").await;
    let settings = fast_settings("127.0.0.1:0");

    let client = ConfigClient::<Gateway>::all(&addr.to_string(), &settings).unwrap();
    let (tx, _rx) = mpsc::channel(8);
    let client_token = CancellationToken::new();
    client.watch(client_token.clone(), tx).unwrap();

    for _ in 0..40 {
        if server.dispatcher().subscriber_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(server.dispatcher().subscriber_count(), 1);

    client_token.cancel();
    for _ in 0..80 {
        if server.dispatcher().subscriber_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(server.dispatcher().subscriber_count(), 0);

    server_token.cancel();
}

#[tokio::test]
async fn test_server_reclaims_watcher_that_never_answers() {
    enable_logger();
    let (server, addr, server_token) = start_server("127.0.0.1:0").await;
    let liveness = CONNECTIONS_CLOSED.with_label_values(&["liveness_timeout"]);
    let before = liveness.get();

    // a raw socket that is never read, so the server's pings go unanswered
    let (_socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/api/v1/configs?watch=true"))
            .await
            .unwrap();
    assert!(wait_for_subscribers(&server, 1, Duration::from_secs(1)).await);

    // pong wait is 800ms
    assert!(wait_for_subscribers(&server, 0, Duration::from_secs(2)).await);
    assert!(liveness.get() > before);

    server_token.cancel();
}

#[tokio::test]
async fn test_server_closes_watcher_that_stops_reading() {
    enable_logger();
    let (server, addr, server_token) = start_server("127.0.0.1:0").await;
    let write_timeouts = CONNECTIONS_CLOSED.with_label_values(&["write_timeout"]);
    let before = write_timeouts.get();

    // far more than the socket buffers hold, so a write stalls
    let realm = "x".repeat(512 * 1024);
    let entries = (0..48)
        .map(|i| gateway(&format!("ns1/gw{i}"), &realm))
        .collect();
    server.update_config(entries).unwrap();

    let (_socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/api/v1/configs?watch=true"))
            .await
            .unwrap();

    // write wait is 200ms, well before the liveness window closes
    assert!(wait_for_subscribers(&server, 0, Duration::from_secs(2)).await);
    assert!(write_timeouts.get() > before);

    server_token.cancel();
}
