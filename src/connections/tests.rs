use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time;

use crate::clusters::{AddressFamily, ClusterHandle, ClusterOptions, NodeStatus};
use crate::connections::client::RpcClient;
use crate::connections::error::RpcError;
use crate::connections::request::RpcResponse;
use crate::connections::server::RpcServer;
use crate::logging::LogHandle;

/// Starts a gossip node with its RPC server; returns the RPC address and gossip address.
async fn start_node(seeds: Vec<SocketAddr>) -> (SocketAddr, SocketAddr) {
    let cluster = ClusterHandle::start(ClusterOptions {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        family: AddressFamily::V4,
        seeds,
        protocol_period: Duration::from_millis(100),
        max_broadcast_bytes: 16,
    })
    .await
    .unwrap();
    let gossip_addr = cluster.local_addr();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let rpc_addr = listener.local_addr().unwrap();
    tokio::spawn(RpcServer::new(listener, cluster, LogHandle::detached()).run());

    (rpc_addr, gossip_addr)
}

async fn wait_until_healthy(client: &mut RpcClient, addr: SocketAddr) {
    time::timeout(Duration::from_secs(5), async {
        while !client.healthy().await.unwrap().iter().any(|n| n.addr == addr) {
            time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("node never became healthy");
}

#[tokio::test]
async fn test_local_address_and_self_listing() {
    let (rpc, gossip) = start_node(vec![]).await;
    let mut client = RpcClient::connect(rpc).await.unwrap();

    assert_eq!(client.local_address().await.unwrap(), gossip);

    let nodes = client.nodes().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].addr, gossip);
    assert_eq!(nodes[0].status, NodeStatus::Alive);
}

#[tokio::test]
async fn test_join_over_rpc() {
    let (rpc_a, gossip_a) = start_node(vec![]).await;
    let (rpc_b, gossip_b) = start_node(vec![]).await;

    let mut client_b = RpcClient::connect(rpc_b).await.unwrap();
    client_b.join(gossip_a).await.unwrap();

    let mut client_a = RpcClient::connect(rpc_a).await.unwrap();
    wait_until_healthy(&mut client_a, gossip_b).await;
}

#[tokio::test]
async fn test_ping_over_rpc() {
    let (rpc_a, _) = start_node(vec![]).await;
    let (_, gossip_b) = start_node(vec![]).await;

    let mut client = RpcClient::connect(rpc_a).await.unwrap();
    assert!(client.ping(gossip_b).await.unwrap());
}

#[tokio::test]
async fn test_oversized_broadcast_is_an_error_response() {
    let (rpc, _) = start_node(vec![]).await;
    let mut client = RpcClient::connect(rpc).await.unwrap();

    let result = client.broadcast(vec![0; 17]).await;
    assert!(matches!(result, Err(RpcError::Rejected(_))));

    // The connection stays usable after a rejected request.
    client.broadcast(vec![0; 16]).await.unwrap();
}

#[tokio::test]
async fn test_log_threshold_is_validated() {
    let (rpc, _) = start_node(vec![]).await;
    let mut client = RpcClient::connect(rpc).await.unwrap();

    client.set_log_threshold("debug").await.unwrap();
    assert!(matches!(
        client.set_log_threshold("loud").await,
        Err(RpcError::Rejected(_))
    ));
    client.set_heartbeat(Duration::from_millis(200)).await.unwrap();
}

#[tokio::test]
async fn test_stream_delivers_broadcasts() {
    let (rpc_a, gossip_a) = start_node(vec![]).await;
    let (rpc_b, gossip_b) = start_node(vec![gossip_a]).await;

    let mut client_a = RpcClient::connect(rpc_a).await.unwrap();
    wait_until_healthy(&mut client_a, gossip_b).await;

    let mut feed = RpcClient::connect(rpc_b).await.unwrap().stream().await.unwrap();
    // Give the server a moment to subscribe before anything is sent.
    time::sleep(Duration::from_millis(100)).await;
    client_a.broadcast(b"news".to_vec()).await.unwrap();

    let response = time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("broadcast should be streamed")
        .unwrap();
    assert_eq!(
        response,
        RpcResponse::Broadcast {
            origin: gossip_a,
            index: 0,
            payload: b"news".to_vec(),
        }
    );
}

#[tokio::test]
async fn test_monitor_reports_new_members() {
    let (rpc_a, gossip_a) = start_node(vec![]).await;
    let mut feed = RpcClient::connect(rpc_a).await.unwrap().monitor().await.unwrap();
    time::sleep(Duration::from_millis(100)).await;

    let (_, gossip_b) = start_node(vec![gossip_a]).await;

    let response = time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("status change should be reported")
        .unwrap();
    assert!(matches!(
        response,
        RpcResponse::StatusChanged { addr, status: NodeStatus::Alive, .. } if addr == gossip_b
    ));
}
