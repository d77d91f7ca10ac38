use anyhow::Context;
use snackchat::{AppState, Config, Hub, Store};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,snackchat=debug,sqlx=warn,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    // no store, no server
    let store = Store::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to store at {}", config.database_url))?;
    tracing::info!("connected to store");

    let app = snackchat::router(AppState {
        store,
        hub: Hub::new(),
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
