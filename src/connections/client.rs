use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpStream, ToSocketAddrs};

use crate::connections::clients::{ClientStreamReader, ClientStreamWriter};
use crate::connections::error::RpcError;
use crate::connections::request::{NodeInfo, RpcRequest, RpcResponse};

/// Control-plane client for a running node.
pub struct RpcClient {
    reader: ClientStreamReader,
    writer: ClientStreamWriter,
}

/// A connection turned into an event feed by `stream` or `monitor`.
pub struct RpcSubscription {
    reader: ClientStreamReader,
    // Held so the server does not see the connection half-closed.
    _writer: ClientStreamWriter,
}

impl RpcClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: ClientStreamReader::new(read_half),
            writer: ClientStreamWriter(write_half),
        })
    }

    pub async fn call(&mut self, request: &RpcRequest) -> Result<RpcResponse, RpcError> {
        self.writer.write_frame(request).await?;
        match self.reader.read_request::<RpcResponse>().await? {
            RpcResponse::Error(reason) => Err(RpcError::Rejected(reason)),
            response => Ok(response),
        }
    }

    pub async fn join(&mut self, addr: SocketAddr) -> Result<(), RpcError> {
        self.call_ok(&RpcRequest::Join(addr)).await
    }

    pub async fn leave(&mut self, addr: SocketAddr) -> Result<(), RpcError> {
        self.call_ok(&RpcRequest::Leave(addr)).await
    }

    pub async fn broadcast(&mut self, payload: Vec<u8>) -> Result<(), RpcError> {
        self.call_ok(&RpcRequest::Broadcast(payload)).await
    }

    pub async fn set_heartbeat(&mut self, period: Duration) -> Result<(), RpcError> {
        let ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        self.call_ok(&RpcRequest::SetHeartbeat(ms)).await
    }

    pub async fn set_log_threshold(&mut self, level: &str) -> Result<(), RpcError> {
        self.call_ok(&RpcRequest::SetLogThreshold(level.to_owned()))
            .await
    }

    pub async fn nodes(&mut self) -> Result<Vec<NodeInfo>, RpcError> {
        self.call_nodes(&RpcRequest::Nodes).await
    }

    pub async fn healthy(&mut self) -> Result<Vec<NodeInfo>, RpcError> {
        self.call_nodes(&RpcRequest::Healthy).await
    }

    pub async fn ping(&mut self, addr: SocketAddr) -> Result<bool, RpcError> {
        match self.call(&RpcRequest::Ping(addr)).await? {
            RpcResponse::Pong { alive } => Ok(alive),
            other => Err(unexpected(other)),
        }
    }

    pub async fn local_address(&mut self) -> Result<SocketAddr, RpcError> {
        match self.call(&RpcRequest::LocalAddress).await? {
            RpcResponse::Address(addr) => Ok(addr),
            other => Err(unexpected(other)),
        }
    }

    /// Received broadcasts, as `RpcResponse::Broadcast`.
    pub async fn stream(mut self) -> Result<RpcSubscription, RpcError> {
        self.writer.write_frame(&RpcRequest::Stream).await?;
        Ok(self.into_subscription())
    }

    /// Membership changes, as `RpcResponse::StatusChanged`.
    pub async fn monitor(mut self) -> Result<RpcSubscription, RpcError> {
        self.writer.write_frame(&RpcRequest::Monitor).await?;
        Ok(self.into_subscription())
    }

    fn into_subscription(self) -> RpcSubscription {
        RpcSubscription {
            reader: self.reader,
            _writer: self.writer,
        }
    }

    async fn call_ok(&mut self, request: &RpcRequest) -> Result<(), RpcError> {
        match self.call(request).await? {
            RpcResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn call_nodes(&mut self, request: &RpcRequest) -> Result<Vec<NodeInfo>, RpcError> {
        match self.call(request).await? {
            RpcResponse::Nodes(nodes) => Ok(nodes),
            other => Err(unexpected(other)),
        }
    }
}

impl RpcSubscription {
    pub async fn next(&mut self) -> Result<RpcResponse, RpcError> {
        self.reader.read_request().await
    }
}

fn unexpected(response: RpcResponse) -> RpcError {
    RpcError::UnexpectedResponse(format!("{:?}", response))
}
