use tokio::signal;
use tracing::{error, info};
use tradewire::infrastructure::config::Config;
use tradewire::infrastructure::factory::build_gateway;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = match Config::load(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {path}: {e}");
            std::process::exit(1);
        }
    };

    config.init_logging();
    info!(config = %path, "tradewire starting");

    // Both reqwest and tokio-tungstenite link rustls; pin the process-wide provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        info!("TLS crypto provider already installed");
    }

    let gateway = match build_gateway(&config).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!(error = %e, "Failed to build gateway");
            std::process::exit(1);
        }
    };
    if let Err(e) = gateway.start_all() {
        error!(error = %e, "Failed to start venues");
        std::process::exit(1);
    }

    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");

    gateway.stop_all().await;
    info!("tradewire stopped");
}
