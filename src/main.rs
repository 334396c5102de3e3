mod config;
mod error;
mod ai {
    pub mod agents;
    pub mod client;
    pub mod dify;
    pub mod prompts;
    pub mod retry;
    pub mod schema_utils;
    pub mod types;
}
mod workflow {
    pub mod graph;
    pub mod normalize;
    pub mod tree;
}
mod orchestrator;
mod runner;
mod server;

use config::Config;
use dotenv::dotenv;
use orchestrator::Workbench;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = Config::from_env()?;
    for (service, key) in [
        (ai::client::SERVICE_NAME, &config.gemini.api_key),
        (ai::dify::SERVICE_NAME, &config.dify.api_key),
    ] {
        if let Err(e) = key.require(service) {
            log::warn!("⚠️  {e}; related endpoints will answer 500");
        }
    }

    let workbench = Arc::new(Workbench::from_config(&config)?);
    let app = server::router(workbench);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    println!("🤖 PROMPT FORGE READY");
    println!("🌐 Listening on http://{}", config.bind_addr);
    log::info!("Model: {}", config.gemini.model);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await?;

    Ok(())
}
