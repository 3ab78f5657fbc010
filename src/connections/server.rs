use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;

use crate::clusters::{ClusterHandle, Node, SwimEvent};
use crate::connections::clients::{ClientStreamReader, ClientStreamWriter};
use crate::connections::error::RpcError;
use crate::connections::request::{NodeInfo, RpcRequest, RpcResponse};
use crate::logging::LogHandle;

/// Serves the control plane: one task per TCP connection, one response per request,
/// except `Stream` and `Monitor`, which turn the connection into an event feed.
pub struct RpcServer {
    listener: TcpListener,
    cluster: ClusterHandle,
    log: LogHandle,
}

impl RpcServer {
    pub fn new(listener: TcpListener, cluster: ClusterHandle, log: LogHandle) -> Self {
        Self {
            listener,
            cluster,
            log,
        }
    }

    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!("RPC listening on {}", addr);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("RPC connection from {}", peer);
                    let session = Session {
                        cluster: self.cluster.clone(),
                        log: self.log.clone(),
                    };
                    tokio::spawn(async move {
                        if let Err(err) = session.handle_client_stream(stream).await {
                            tracing::warn!("RPC connection from {} failed: {}", peer, err);
                        }
                    });
                }
                Err(err) => tracing::warn!("Failed to accept RPC connection: {}", err),
            }
        }
    }
}

struct Session {
    cluster: ClusterHandle,
    log: LogHandle,
}

enum Feed {
    Broadcasts,
    StatusChanges,
}

impl Session {
    async fn handle_client_stream(&self, stream: TcpStream) -> Result<(), RpcError> {
        let (read_half, write_half) = stream.into_split();
        let mut reader = ClientStreamReader::new(read_half);
        let mut writer = ClientStreamWriter(write_half);

        loop {
            let request = match reader.read_request::<RpcRequest>().await {
                Ok(request) => request,
                Err(RpcError::ConnectionClosed) => return Ok(()),
                Err(err) => return Err(err),
            };
            tracing::debug!("RPC request: {:?}", request);

            match request {
                RpcRequest::Stream => return self.feed(Feed::Broadcasts, &mut writer).await,
                RpcRequest::Monitor => return self.feed(Feed::StatusChanges, &mut writer).await,
                request => {
                    let response = self.respond(request).await;
                    writer.write_frame(&response).await?;
                }
            }
        }
    }

    async fn respond(&self, request: RpcRequest) -> RpcResponse {
        let outcome = match request {
            RpcRequest::Join(addr) => self.cluster.join(addr).await.map(|_| RpcResponse::Ok),
            RpcRequest::Leave(addr) => self.cluster.leave(addr).await.map(|_| RpcResponse::Ok),
            RpcRequest::Broadcast(payload) => {
                self.cluster.broadcast(payload).await.map(|_| RpcResponse::Ok)
            }
            RpcRequest::Nodes => Ok(RpcResponse::Nodes(node_infos(self.cluster.nodes()))),
            RpcRequest::Healthy => Ok(RpcResponse::Nodes(node_infos(self.cluster.healthy()))),
            RpcRequest::SetHeartbeat(ms) => self
                .cluster
                .set_protocol_period(Duration::from_millis(ms))
                .await
                .map(|_| RpcResponse::Ok),
            RpcRequest::SetLogThreshold(level) => {
                return match self.log.set_level(&level) {
                    Ok(()) => RpcResponse::Ok,
                    Err(err) => RpcResponse::Error(err.to_string()),
                };
            }
            RpcRequest::Ping(addr) => self
                .cluster
                .ping(addr)
                .await
                .map(|alive| RpcResponse::Pong { alive }),
            RpcRequest::LocalAddress => Ok(RpcResponse::Address(self.cluster.local_addr())),
            RpcRequest::Stream | RpcRequest::Monitor => {
                return RpcResponse::Error("feeds are not request/response".into());
            }
        };

        outcome.unwrap_or_else(|err| RpcResponse::Error(err.to_string()))
    }

    async fn feed(&self, feed: Feed, writer: &mut ClientStreamWriter) -> Result<(), RpcError> {
        let mut events = self.cluster.subscribe();
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("RPC subscriber lagged, {} event(s) skipped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return Ok(()),
            };

            let response = match (&feed, event) {
                (Feed::Broadcasts, SwimEvent::BroadcastReceived(broadcast)) => {
                    RpcResponse::Broadcast {
                        origin: broadcast.origin().addr(),
                        index: broadcast.index(),
                        payload: broadcast.bytes().to_vec(),
                    }
                }
                (
                    Feed::StatusChanges,
                    SwimEvent::StatusChanged {
                        node,
                        status,
                        heartbeat,
                    },
                ) => RpcResponse::StatusChanged {
                    addr: node.addr(),
                    status,
                    heartbeat,
                },
                _ => continue,
            };

            match writer.write_frame(&response).await {
                Ok(()) => {}
                // The subscriber hung up.
                Err(RpcError::Io(_)) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }
}

fn node_infos(nodes: Vec<std::sync::Arc<Node>>) -> Vec<NodeInfo> {
    nodes
        .iter()
        .map(|node| NodeInfo {
            addr: node.addr(),
            status: node.status(),
            heartbeat: node.heartbeat(),
        })
        .collect()
}
