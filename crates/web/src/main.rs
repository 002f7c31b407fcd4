use std::path::PathBuf;

use tracing::info;

use inplace_web::WebConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // INPLACE_CONFIG names an optional TOML file; INPLACE_* variables override it.
    let config_path = std::env::var("INPLACE_CONFIG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| inplace_common::default_store_path().join("web.toml"));

    let cfg = WebConfig::load(&config_path)?.with_env()?;

    info!(
        "Starting Inplace web API on http://{} (db: {}, locale: {})",
        cfg.listen,
        cfg.db_path.display(),
        cfg.default_locale
    );

    inplace_web::server::serve(cfg).await
}
