mod face;

use anyhow::Result;
use arpa::{Config, logging};
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    logging::init();

    let config = Arc::new(Config::from_env());
    std::fs::create_dir_all(&config.workflows_dir)?;
    info!("Workflows directory: {}", config.workflows_dir.display());

    face::serve(config).await
}
