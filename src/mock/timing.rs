use axum::{
    extract::{MatchedPath, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::debug;

/// Label for requests that matched no route.
pub const UNMATCHED: &str = "unmatched";

/// `Server-Timing` entry naming the mock route that answered.
pub fn server_timing(route: &str, elapsed_ms: f64) -> String {
    format!("mock;desc=\"{route}\";dur={elapsed_ms:.3}")
}

/// Stamps each response with the route template and handler time, and logs
/// the call at debug level.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED.to_owned());
    let method = req.method().clone();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    if let Ok(val) = HeaderValue::from_str(&server_timing(&route, elapsed_ms)) {
        response.headers_mut().insert("server-timing", val);
    }

    debug!(
        route = %route,
        %method,
        status = response.status().as_u16(),
        elapsed_ms,
        "mock target answered"
    );
    response
}
