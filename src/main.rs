use labtrack::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    println!("LabTrack: Laboratory Chemical Inventory Server");

    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}, storage={:?}",
        config.server.host, config.server.port, config.storage.backend
    );
    if config.auth.allow_anonymous {
        log::warn!("Anonymous access is enabled; requests without a token act as an admin");
    }

    labtrack::run_server(config).await
}
