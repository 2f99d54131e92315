//! Ledger gRPC server binary

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use sqlx::mysql::MySqlPoolOptions;
use tonic::transport::Server;
use tracing::{error, info};

use memledger::config::Config;
use memledger::grpc::proto::ledger_service_server::LedgerServiceServer;
use memledger::grpc::LedgerGrpcServer;
use memledger::ledger::Ledger;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("starting memledger server");

    let config = Config::load()?;
    info!(
        service = %config.service_name,
        version = %config.service_version,
        variant = ?config.variant,
        wal = %config.wal_path.display(),
        "configuration loaded"
    );

    let pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    info!("database connection pool established");

    let ledger = Arc::new(Ledger::open(&config, &pool).await?);
    info!("ledger ready");

    let metrics_addr: SocketAddr = config.metrics_listen_addr.parse()?;
    let registry = ledger.metrics().registry();
    tokio::spawn(async move {
        if let Err(e) = serve_metrics(metrics_addr, registry).await {
            error!(error = %e, "metrics endpoint failed");
        }
    });

    let grpc_addr: SocketAddr = config.grpc_listen_addr.parse()?;
    info!(%grpc_addr, "serving gRPC");
    Server::builder()
        .add_service(LedgerServiceServer::new(LedgerGrpcServer::new(
            ledger.clone(),
        )))
        .serve_with_shutdown(grpc_addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // Drain in-flight work and flush the log before exiting.
    ledger.shutdown().await?;
    info!("server exited");
    Ok(())
}

async fn serve_metrics(addr: SocketAddr, registry: Arc<Registry>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(registry);

    info!(%addr, "serving health and metrics");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics(State(registry): State<Arc<Registry>>) -> Result<String, StatusCode> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
