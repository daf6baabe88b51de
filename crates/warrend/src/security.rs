use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn json_error(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        axum::Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Static bearer check for every control operation. The liveness probe is
/// routed outside this layer.
pub async fn bearer_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", state.secret);
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if presented != Some(expected.as_str()) {
        return json_error(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    next.run(req).await
}
