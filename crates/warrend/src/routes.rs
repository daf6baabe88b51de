use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use warren_provision::{Error, InstanceSpec, TelegramUpdate};

use crate::security::json_error;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ProvisionResponse {
    success: bool,
    port: u16,
    #[serde(rename = "gatewayToken")]
    gateway_token: String,
}

#[derive(Debug, Serialize)]
struct OkResponse {
    success: bool,
}

fn error_response(context: &str, err: Error) -> Response {
    let status = match &err {
        Error::InvalidSpec(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::error!(%err, context, "operation failed");
    json_error(status, err.to_string())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn provision(State(state): State<AppState>, Json(spec): Json<InstanceSpec>) -> Response {
    match state.provisioner.provision(&spec).await {
        Ok(out) => Json(ProvisionResponse {
            success: true,
            port: out.port,
            gateway_token: out.gateway_token,
        })
        .into_response(),
        Err(err) => error_response("provision", err),
    }
}

pub async fn stop(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    match state.provisioner.stop(&slug).await {
        Ok(()) => Json(OkResponse { success: true }).into_response(),
        Err(err) => error_response("stop", err),
    }
}

pub async fn restart(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    match state.provisioner.restart(&slug).await {
        Ok(()) => Json(OkResponse { success: true }).into_response(),
        Err(err) => error_response("restart", err),
    }
}

pub async fn telegram(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(update): Json<TelegramUpdate>,
) -> Response {
    match state.provisioner.reconfigure_telegram(&slug, update).await {
        Ok(()) => Json(OkResponse { success: true }).into_response(),
        Err(err) => error_response("telegram", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_follow_the_failure_class() {
        let cases = [
            (Error::InvalidSpec("bad".into()), StatusCode::BAD_REQUEST),
            (Error::NotFound("ghost".into()), StatusCode::NOT_FOUND),
            (
                Error::Layout(std::io::Error::other("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let resp = error_response("test", err);
            assert_eq!(resp.status(), expected);
        }
    }
}
