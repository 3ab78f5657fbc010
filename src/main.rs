use gossipguard::{StartUp, config::ENV, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log = logging::init(&ENV.log_level)?;
    StartUp.run(log).await
}
