use std::sync::Arc;

use certificados::{create_router, AppState, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certificados=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let state = Arc::new(AppState::new(config));
    state.generator.layout().ensure_dirs()?;

    let app = create_router(state.clone());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    tracing::info!("Generador de certificados listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
