//! `X-Degraded-Features` response annotation.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use crate::state::AppState;

pub const DEGRADED_HEADER: &str = "x-degraded-features";

/// Attach the comma-separated list of degraded or disabled capabilities
/// whenever there is at least one.
pub async fn annotate_degraded(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let degraded = state.health.list_degraded();
    if !degraded.is_empty() {
        match HeaderValue::from_str(&degraded.join(",")) {
            Ok(v) => {
                resp.headers_mut().insert(DEGRADED_HEADER, v);
            }
            Err(e) => tracing::warn!(error = %e, "degraded feature list is not a valid header"),
        }
    }
    resp
}
