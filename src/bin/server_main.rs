use std::path::PathBuf;

use clap::Parser;

use ccx_gateway::{config, logger, server};

/// Client-adapting gateway for the Messages and Responses APIs
#[derive(Parser, Debug)]
#[command(name = "ccx-server", version, about)]
struct Args {
    /// Settings file (TOML). Defaults to the per-user config directory.
    #[arg(short, long, env = "CCX_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the settings file
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides the settings file
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut settings = match config::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            std::process::exit(2);
        }
    };
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    logger::init(&settings.logging);
    ccx_gateway::install_panic_hook();
    logger::info(
        "app",
        &format!(
            "Starting ccx-server v{} (environment={})",
            env!("CARGO_PKG_VERSION"),
            settings.environment
        ),
    );

    if let Err(e) = server::serve(settings).await {
        logger::error("app", &format!("Server failed: {}", e));
        std::process::exit(1);
    }
}
