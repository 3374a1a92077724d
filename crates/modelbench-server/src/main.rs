//! ModelBench agent server
//!
//! Hosts the thirteen evaluation agents behind one dispatch surface:
//! - `POST /api/v1/agents/{agent-id}` invokes an agent
//! - `GET /api/v1/agents` lists registered agents
//! - `GET /health`, `GET /ready`, `GET /metrics` for operations
//!
//! Startup is strict: the required environment must be complete and the
//! durable-store gateway must answer a liveness probe, otherwise the
//! process aborts with a structured `agent_abort` log line.

use clap::Parser;
use modelbench_server::app::{AppState, build_router};
use modelbench_server::env::EnvSnapshot;
use modelbench_agents::{AgentContext, AgentRegistry};
use modelbench_decision::{
    DecisionPipeline, GatewayClient, GatewayConfig, GatewayHealth, PipelineConfig,
};
use modelbench_executor::Executor;
use modelbench_observability::{LogFormat, Metrics, init_tracing};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "modelbench-server", about = "Multi-provider LLM evaluation agents")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "MODELBENCH_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Emit logs as JSON lines
    #[arg(long, env = "MODELBENCH_JSON_LOGS")]
    json_logs: bool,
}

fn abort(reason: &str) -> ! {
    error!(event = "agent_abort", reason, "startup aborted");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    let snapshot = match EnvSnapshot::from_env() {
        Ok(snapshot) => snapshot,
        Err(err) => abort(&err.to_string()),
    };
    info!(
        agent_name = %snapshot.agent_name,
        agent_domain = %snapshot.agent_domain,
        "environment validated"
    );

    let gateway = match GatewayClient::new(GatewayConfig::new(
        snapshot.ruvector_service_url.clone(),
        snapshot.ruvector_api_key.clone(),
    )) {
        Ok(gateway) => Arc::new(gateway),
        Err(err) => abort(&err.to_string()),
    };
    // Mandatory liveness probe; the gateway client enforces the 5s deadline
    if let Err(err) = gateway.liveness().await {
        abort(&err.to_string());
    }
    info!(url = %snapshot.ruvector_service_url, "durable-store gateway is live");

    let pipeline = Arc::new(DecisionPipeline::start(
        Arc::clone(&gateway),
        PipelineConfig::default(),
    ));
    let executor = match Executor::with_wire_defaults() {
        Ok(executor) => Arc::new(executor),
        Err(err) => abort(&err.to_string()),
    };
    let registry = Arc::new(AgentRegistry::with_default_agents(AgentContext::new(
        executor,
        Arc::clone(&pipeline),
    )));
    let metrics = match Metrics::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(err) => abort(&err.to_string()),
    };

    let state = AppState {
        registry: Arc::clone(&registry),
        health: Arc::new(GatewayHealth::new(Arc::clone(&gateway))),
        metrics,
    };
    let router = build_router(state);

    let listener = TcpListener::bind(args.listen).await?;
    info!(listen = %args.listen, agents = registry.len(), "modelbench server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("draining decision pipeline");
    pipeline.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
