pub mod clusters;
pub mod config;
pub mod connections;
pub mod logging;
mod schedulers;

use anyhow::Result;
use tokio::net::TcpListener;

use crate::{
    clusters::ClusterHandle, config::ENV, connections::server::RpcServer, logging::LogHandle,
};

#[derive(Debug)]
pub struct StartUp;

impl StartUp {
    pub async fn run(self, log: LogHandle) -> Result<()> {
        ENV.validate()?;

        let cluster = ClusterHandle::start(ENV.cluster_options()?).await?;
        tracing::info!("Gossiping on {}", cluster.local_addr());

        let addr = ENV.bind_addr();
        let listener = TcpListener::bind(&addr).await?;

        RpcServer::new(listener, cluster, log).run().await;
        Ok(())
    }
}
