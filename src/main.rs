use anyhow::Context;
use clap::Parser;
use osint_broker::{
    cli::{run_search, Cli, Commands},
    config::ServerConfig,
    modules::default_registry,
    server::build_router,
    state::AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "osint_broker=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = ServerConfig::from_env()?;
    let modules = default_registry(&config.module_settings()).context("Failed to build search modules")?;

    // Handle CLI commands
    match cli.command {
        Some(Commands::Modules) => {
            println!("{:<28} {}", "Module", "Aliases");
            println!("{}", "-".repeat(48));
            for info in modules.describe() {
                println!("{:<28} {}", info.name, info.aliases.join(", "));
            }
            return Ok(());
        }
        Some(Commands::Search {
            module,
            query,
            topic,
        }) => {
            return run_search(&config, &modules, &module, &query, topic).await;
        }
        Some(Commands::Serve) | None => {
            // Continue to run server
        }
    }

    // Server mode
    info!("🚀 Starting OSINT broker v{}", VERSION);
    info!("📋 Configuration loaded:");
    info!("   Port: {}", config.port);
    info!("   Bind address: {}", config.bind_address());
    info!("   Max connections: {}", config.max_connections);
    info!("   Cancel acknowledgment window: {}ms", config.cancel_ack_timeout_ms);
    info!(
        "   Fan-out limits: {} sites, {} instances",
        config.lookup_concurrency, config.instance_concurrency
    );
    info!("   Modules: {}", modules.names().join(", "));

    let state = Arc::new(AppState::new(config.clone(), modules));
    let app = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.bind_address().parse()?;
    info!("🎧 Listening on http://{}", addr);
    info!("📡 WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl-C, then signal every running search
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    let cancelled = state.orchestrator.shutdown();
    info!("🛑 Shutting down, cancelled {} running searches", cancelled);
}
