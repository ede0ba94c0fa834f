use contentpublisher::{
    logging,
    routes::{create_app, AppState},
    Config, Services,
};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "HTTP backend for the content publisher add-on", long_about = None)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the config
    #[arg(short, long)]
    port: Option<u16>,

    /// File generated add-on code is written to (default `src/code.js`).
    /// Relative paths resolve against the current working directory.
    #[arg(long)]
    design_output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(path) = args.design_output {
        config.storage.design_output = path;
    }
    config.storage.resolve_relative_to(&std::env::current_dir()?);

    // Initialize logging
    logging::init(&config.log_level)?;

    config.validate().await?;
    let addr = config.bind_addr()?;

    let services = Services::from_config(config)?;
    services.store.ensure_layout().await?;

    info!("ContentPublisher server starting...");
    info!("Uploads directory: {}", services.store.root().display());
    info!("Design code output: {}", services.config.storage.design_output.display());
    info!("Model: {}", services.model.model_id());

    // Build application routes
    let app = create_app(AppState::new(services));

    // Start the server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/api/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
