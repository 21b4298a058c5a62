use std::time::Duration;

use cds::ConfigClient;
use cds::ConnectionError;
use cds::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::common::enable_logger;
use crate::common::fast_settings;
use crate::common::gateway;
use crate::common::recv_within;
use crate::common::start_server;
use crate::common::Gateway;

#[tokio::test]
async fn test_poll_delivers_first_value_then_stops() {
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
    let token = CancellationToken::new();

    let mut polls = Vec::new();
    for (client, tx) in [(client1, tx1), (client2, tx2), (client3, tx3)] {
        let token = token.clone();
        polls.push(tokio::spawn(async move { client.poll(token, tx).await }));
    }

    // no result yet
    assert!(recv_within(&mut rx1, Duration::from_millis(10)).await.is_none());
    assert!(recv_within(&mut rx2, Duration::from_millis(10)).await.is_none());
    assert!(recv_within(&mut rx3, Duration::from_millis(10)).await.is_none());

    // let the pollers register before the update
    tokio::time::sleep(Duration::from_millis(100)).await;

    let c1 = gateway("ns1/gw1", "realm1");
    let c2 = gateway("ns1/gw2", "realm1");
    server.update_config(vec![c1.clone(), c2.clone()]).unwrap();
    assert_eq!(server.snapshot().len(), 2);

    assert_eq!(recv_within(&mut rx1, Duration::from_millis(500)).await, Some(c1));
    assert_eq!(recv_within(&mut rx2, Duration::from_millis(500)).await, Some(c2));
    assert!(recv_within(&mut rx3, Duration::from_millis(500)).await.is_none());

    server.update_config(vec![]).unwrap();
    assert!(server.snapshot().is_empty());

    assert!(recv_within(&mut rx1, Duration::from_millis(10)).await.is_none());
    assert!(recv_within(&mut rx2, Duration::from_millis(10)).await.is_none());
    assert!(recv_within(&mut rx3, Duration::from_millis(10)).await.is_none());

    // cancellation is a clean stop for the one still waiting
    token.cancel();
    for poll in polls {
        let result = tokio::time::timeout(Duration::from_secs(1), poll)
            .await
            .expect("poll should return after cancel")
            .unwrap();
        assert!(result.is_ok(), "{result:?}");
    }

    server_token.cancel();
}

#[tokio::test]
async fn test_poll_returns_immediately_with_existing_value() {
    let (server, addr, server_token) = start_server("127.0.0.1:0").await;
    let settings = fast_settings("127.0.0.1:0");
    server
        .update_config(vec![gateway("ns1/gw1", "realm1")])
        .unwrap();

    let client = ConfigClient::<Gateway>::namespace(&addr.to_string(), "ns1", &settings).unwrap();
    let (tx, mut rx) = mpsc::channel(8);

    tokio::time::timeout(Duration::from_secs(2), client.poll(CancellationToken::new(), tx))
        .await
        .expect("poll should not block with a stored value")
        .unwrap();
    assert_eq!(rx.recv().await, Some(gateway("ns1/gw1", "realm1")));

    server_token.cancel();
}

#[tokio::test]
async fn test_poll_fails_without_server() {
    let settings = fast_settings("127.0.0.1:0");
    let client = ConfigClient::<Gateway>::all("127.0.0.1:1", &settings).unwrap();
    let (tx, _rx) = mpsc::channel(8);

    let err = client.poll(CancellationToken::new(), tx).await.unwrap_err();
    assert!(err.is_transient(), "{err:?}");
}

#[tokio::test]
async fn test_poll_fails_when_server_goes_silent() {
    enable_logger();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // completes the handshake, then never reads nor answers pings
    let silent = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(socket);
    });

    let settings = fast_settings("127.0.0.1:0");
    let client = ConfigClient::<Gateway>::all(&addr.to_string(), &settings).unwrap();
    let (tx, _rx) = mpsc::channel(8);

    let started = Instant::now();
    let err = tokio::time::timeout(Duration::from_secs(3), client.poll(CancellationToken::new(), tx))
        .await
        .expect("poll should give up on a silent server")
        .unwrap_err();
    assert!(
        matches!(err, Error::Connection(ConnectionError::LivenessTimeout(_))),
        "{err:?}"
    );
    assert!(err.is_transient());
    assert!(started.elapsed() >= settings.keepalive.pong_wait());

    silent.abort();
}
