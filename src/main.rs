use anyhow::Result;
use relay_chat::{ServerConfig, Server, logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info");

    let config = ServerConfig::from_env()?;

    let server = Server::bind(config).await?;

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupted");
        })
        .await
}
