use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch, post},
};
use warren_process::Pm2;
use warren_provision::skills::HttpSkillSource;
use warren_provision::{Provisioner, layout, ports};

mod routes;
mod security;
mod state;

use state::AppState;

fn http_port() -> u16 {
    std::env::var("WARREN_HTTP_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(3001)
}

fn provisioner_secret() -> String {
    match std::env::var("WARREN_SECRET") {
        Ok(s) if !s.trim().is_empty() => s,
        _ => {
            tracing::warn!("WARREN_SECRET not set, using insecure default");
            "change-me".to_string()
        }
    }
}

/// Everything except the liveness probe sits behind the bearer check.
fn app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/provision", post(routes::provision))
        .route("/stop/:slug", post(routes::stop))
        .route("/restart/:slug", post(routes::restart))
        .route("/telegram/:slug", patch(routes::telegram))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security::bearer_auth,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(protected)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let root = layout::bots_root();
    tracing::info!(root = %root.display(), "bots root");

    let provisioner = Arc::new(Provisioner::new(
        root,
        ports::base_port(),
        Arc::new(Pm2::new()),
        Arc::new(HttpSkillSource::from_env()?),
    ));
    let state = AppState {
        provisioner,
        secret: Arc::from(provisioner_secret()),
    };

    let app = app(state);

    let addr: SocketAddr = ([0, 0, 0, 0], http_port()).into();
    tracing::info!(%addr, "warrend HTTP listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
