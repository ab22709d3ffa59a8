use salesboard::app;
use salesboard::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    log::info!(
        "starting salesboard with {} (view rows {}, sample rows {})",
        config.data.display(),
        config.view_rows,
        config.sample_rows
    );

    // Start the web application
    app::run(config).await?;

    Ok(())
}
