use clap::Parser;
use log::{error, info};
use server::{Args, Server, TextProvider, TextSource};
use std::sync::Arc;

/// Main-method of the server.
/// Parses command-line arguments, loads the texts and serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;

    let texts = if config.text_files.is_empty() {
        TextSource::default()
    } else {
        TextSource::from_files(&config.text_files)?
    };
    info!("Racing on {} text(s)", texts.len());
    let texts: Arc<dyn TextProvider> = Arc::new(texts);

    let server = Server::bind(&config, texts).await?;
    let dispatcher = server.dispatcher();

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            dispatcher.sessions().close_all().await;
        }
    }

    Ok(())
}
