use std::time::Duration;

use cds::ConfigClient;
use cds::ConfigEntry;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::common::enable_logger;
use crate::common::fast_settings;
use crate::common::find;
use crate::common::gateway;
use crate::common::recv_within;
use crate::common::start_server;
use crate::common::Gateway;

async fn recv_all(
    rx: &mut mpsc::Receiver<ConfigEntry<Gateway>>,
    wait: Duration,
) -> Vec<ConfigEntry<Gateway>> {
    let mut entries = Vec::new();
    while let Some(entry) = recv_within(rx, wait).await {
        entries.push(entry);
    }
    entries
}

#[tokio::test]
async fn test_filters_scope_load_and_watch() {
    enable_logger();
    let (server, addr, server_token) = start_server("127.0.0.1:0").await;
    let settings = fast_settings("127.0.0.1:0");
    let address = addr.to_string();

    let client1 = ConfigClient::<Gateway>::all(&address, &settings)
        .unwrap()
        .with_node("all-config-client");
    let client2 = ConfigClient::<Gateway>::namespace(&address, "ns1", &settings).unwrap();
    let client3 = ConfigClient::<Gateway>::namespace(&address, "ns2", &settings).unwrap();
    let client4 = ConfigClient::<Gateway>::exact(&address, "ns1", "gw1", &settings).unwrap();

    let (tx1, mut rx1) = mpsc::channel(8);
    let (tx2, mut rx2) = mpsc::channel(8);
    let (tx3, mut rx3) = mpsc::channel(8);
    let (tx4, mut rx4) = mpsc::channel(8);
    let client_token = CancellationToken::new();
    client1.watch(client_token.clone(), tx1).unwrap();
    client2.watch(client_token.clone(), tx2).unwrap();
    client3.watch(client_token.clone(), tx3).unwrap();
    client4.watch(client_token.clone(), tx4).unwrap();

    assert!(recv_within(&mut rx1, Duration::from_millis(50)).await.is_none());
    assert!(recv_within(&mut rx2, Duration::from_millis(50)).await.is_none());
    assert!(recv_within(&mut rx3, Duration::from_millis(50)).await.is_none());
    assert!(recv_within(&mut rx4, Duration::from_millis(50)).await.is_none());

    // Update 1: ns1/gw1 + ns2/gw1
    let c1 = gateway("ns1/gw1", "realm1");
    let c2 = gateway("ns2/gw1", "realm1");
    server.update_config(vec![c1.clone(), c2.clone()]).unwrap();
    assert_eq!(server.snapshot().len(), 2);

    let all = client1.load().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(find(&all, "ns1/gw1"), Some(&c1));
    assert_eq!(find(&all, "ns2/gw1"), Some(&c2));
    assert_eq!(client2.load().await.unwrap(), vec![c1.clone()]);
    assert_eq!(client3.load().await.unwrap(), vec![c2.clone()]);
    assert_eq!(client4.load().await.unwrap(), vec![c1.clone()]);

    let watched = recv_all(&mut rx1, Duration::from_millis(150)).await;
    assert_eq!(watched.len(), 2);
    assert_eq!(find(&watched, "ns1/gw1"), Some(&c1));
    assert_eq!(find(&watched, "ns2/gw1"), Some(&c2));
    assert_eq!(recv_all(&mut rx2, Duration::from_millis(150)).await, vec![c1.clone()]);
    assert_eq!(recv_all(&mut rx3, Duration::from_millis(150)).await, vec![c2.clone()]);
    assert_eq!(recv_all(&mut rx4, Duration::from_millis(150)).await, vec![c1]);

    // Update 2: ns1/gw1 changes, ns1/gw2 is new, ns2/gw1 is unchanged
    let c1 = gateway("ns1/gw1", "realm-new");
    let c3 = gateway("ns1/gw2", "realm3");
    server
        .update_config(vec![c1.clone(), c2.clone(), c3.clone()])
        .unwrap();
    assert_eq!(server.snapshot().len(), 3);

    let all = client1.load().await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(find(&all, "ns1/gw1"), Some(&c1));
    assert_eq!(find(&all, "ns2/gw1"), Some(&c2));
    assert_eq!(find(&all, "ns1/gw2"), Some(&c3));
    let ns1 = client2.load().await.unwrap();
    assert_eq!(ns1.len(), 2);
    assert_eq!(find(&ns1, "ns1/gw1"), Some(&c1));
    assert_eq!(find(&ns1, "ns1/gw2"), Some(&c3));
    assert_eq!(client3.load().await.unwrap(), vec![c2.clone()]);
    assert_eq!(client4.load().await.unwrap(), vec![c1.clone()]);

    let watched = recv_all(&mut rx1, Duration::from_millis(150)).await;
    assert_eq!(watched.len(), 2);
    assert_eq!(find(&watched, "ns1/gw1"), Some(&c1));
    assert_eq!(find(&watched, "ns1/gw2"), Some(&c3));
    let watched = recv_all(&mut rx2, Duration::from_millis(150)).await;
    assert_eq!(watched.len(), 2);
    assert_eq!(find(&watched, "ns1/gw1"), Some(&c1));
    assert_eq!(find(&watched, "ns1/gw2"), Some(&c3));
    assert!(recv_all(&mut rx3, Duration::from_millis(150)).await.is_empty());
    assert_eq!(recv_all(&mut rx4, Duration::from_millis(150)).await, vec![c1.clone()]);

    // Update 3: everything removed, nobody is told
    server.update_config(vec![]).unwrap();
    assert!(client1.load().await.unwrap().is_empty());
    assert!(client2.load().await.unwrap().is_empty());
    assert!(client4.load().await.unwrap_err().is_not_found());

    assert!(recv_within(&mut rx1, Duration::from_millis(50)).await.is_none());
    assert!(recv_within(&mut rx2, Duration::from_millis(50)).await.is_none());
    assert!(recv_within(&mut rx3, Duration::from_millis(50)).await.is_none());
    assert!(recv_within(&mut rx4, Duration::from_millis(50)).await.is_none());

    client_token.cancel();
    server_token.cancel();
}

#[tokio::test]
async fn test_raw_http_surface() {
    let (server, addr, server_token) = start_server("127.0.0.1:0").await;
    server
        .update_config(vec![gateway("ns1/gw1", "realm1")])
        .unwrap();
    let http = reqwest::Client::new();

    let res = http
        .get(format!("http://{addr}/api/v1/configs/ns1/gw1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["id"], "ns1/gw1");
    assert_eq!(body["config"]["realm"], "realm1");

    let res = http
        .get(format!("http://{addr}/api/v1/configs"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["version"], "v1");
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let res = http
        .get(format!("http://{addr}/api/v1/configs/ns1/gw9"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], 404);

    let res = http
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert!(res.text().await.unwrap().contains("cds_store_size"));

    server_token.cancel();
}
