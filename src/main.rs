use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use calc_gateway::admission::AdmissionMiddleware;
use calc_gateway::build_router;
use calc_gateway::config::{Args, Policy};
use calc_gateway::identity::CredentialStore;
use calc_gateway::state::AppState;
use calc_gateway::sweeper::counter_sweeper;

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    init_logging(&args.log_level);

    let policy = Policy::load(args.policy.as_deref()).context("failed to load admission policy")?;

    info!(
        source = %args.policy.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "built-in".into()),
        api_keys = policy.credentials.len(),
        gated = ?policy.gate.routes().collect::<Vec<_>>(),
        "admission policy loaded"
    );
    for (route, rules) in policy.route_rules.routes() {
        for rule in rules {
            info!(route, rule = %rule.name, max = rule.max_count, window = ?rule.window, "rate rule");
        }
    }

    let state = Arc::new(AppState::new(AdmissionMiddleware::from_policy(policy)));

    // spawn the background sweeper
    if args.sweep_interval > 0 {
        let sweeper_state = Arc::clone(&state);
        let every = Duration::from_secs(args.sweep_interval);
        tokio::spawn(async move {
            counter_sweeper(sweeper_state, every).await;
        });
    }

    let app = build_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "calc-gateway listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;
    Ok(())
}
