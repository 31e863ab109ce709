pub mod auth;
pub mod retry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{HarnessError, HarnessResult};
use crate::metrics::recorder::elapsed_ms;
use crate::metrics::{MetricsAggregator, RequestEvent};

pub use auth::{auth_headers, login, AuthToken};
pub use retry::RetryPolicy;

/// Per-request timeout; a hung target counts as a failed request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest slice of a non-JSON error body kept in the failure message.
const RAW_BODY_PREVIEW: usize = 200;

// ─── Request / response types ────────────────────────────────────

/// What counts as a successful response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// 200 or 201
    Success,
    /// Exactly this status (error simulation expects 400/401 on purpose)
    Status(u16),
}

impl Expect {
    pub fn matches(self, status: u16) -> bool {
        match self {
            Expect::Success => status == 200 || status == 201,
            Expect::Status(code) => status == code,
        }
    }
}

/// One request to issue, named by the logical endpoint it exercises.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub name: String,
    pub body: Option<Value>,
    pub headers: HeaderMap,
    pub expect: Expect,
}

impl RequestSpec {
    pub fn get(path: &str, name: &str) -> Self {
        Self::new(Method::GET, path, name)
    }

    pub fn post(path: &str, name: &str) -> Self {
        Self::new(Method::POST, path, name)
    }

    fn new(method: Method, path: &str, name: &str) -> Self {
        Self {
            method,
            path: path.to_owned(),
            name: name.to_owned(),
            body: None,
            headers: HeaderMap::new(),
            expect: Expect::Success,
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn expect(mut self, expect: Expect) -> Self {
        self.expect = expect;
        self
    }
}

/// A response that arrived, whatever its status.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: u16,
    /// Whether the request was recorded as a success
    pub ok: bool,
    pub body: String,
    pub response_time_ms: f64,
}

impl Outcome {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

// ─── ServiceClient ───────────────────────────────────────────────

/// HTTP client bound to one target host. Every request it sends is timed
/// and reported to the aggregator under its logical endpoint name.
#[derive(Clone)]
pub struct ServiceClient {
    base_url: String,
    http: reqwest::Client,
    metrics: Arc<MetricsAggregator>,
}

impl ServiceClient {
    pub fn new(base_url: &str, http: reqwest::Client, metrics: Arc<MetricsAggregator>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            http,
            metrics,
        }
    }

    /// Shared connection pool for every virtual user.
    pub fn build_http() -> HarnessResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HarnessError::Config(format!("cannot build HTTP client: {e}")))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn with_base_url(&self, base_url: &str) -> Self {
        Self::new(base_url, self.http.clone(), self.metrics.clone())
    }

    /// Send and judge the response against `spec.expect`.
    pub async fn send(&self, spec: RequestSpec) -> HarnessResult<Outcome> {
        let expect = spec.expect;
        self.send_checked(spec, |status, body| {
            if expect.matches(status) {
                Ok(())
            } else {
                Err(describe_failure(expect, status, body))
            }
        })
        .await
    }

    /// Send and let `check` decide success from the status and body.
    /// `check` returns the failure reason when the response is unacceptable.
    pub async fn send_checked<C>(&self, spec: RequestSpec, check: C) -> HarnessResult<Outcome>
    where
        C: FnOnce(u16, &str) -> Result<(), String>,
    {
        let url = format!("{}{}", self.base_url, spec.path);
        let request_type = method_label(&spec.method);
        let mut req = self.http.request(spec.method, &url).headers(spec.headers);
        if let Some(body) = &spec.body {
            req = req.json(body);
        }

        let t0 = Instant::now();
        let response = match req.send().await {
            Ok(r) => r,
            Err(source) => {
                self.report(request_type, &spec.name, elapsed_ms(t0), None, Some(source.to_string()));
                return Err(HarnessError::Http {
                    endpoint: spec.name,
                    source,
                });
            }
        };
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) => text,
            Err(source) => {
                self.report(
                    request_type,
                    &spec.name,
                    elapsed_ms(t0),
                    Some(status),
                    Some(source.to_string()),
                );
                return Err(HarnessError::Http {
                    endpoint: spec.name,
                    source,
                });
            }
        };
        let response_time_ms = elapsed_ms(t0);

        let verdict = check(status, &body);
        let ok = verdict.is_ok();
        self.report(request_type, &spec.name, response_time_ms, Some(status), verdict.err());

        Ok(Outcome {
            status,
            ok,
            body,
            response_time_ms,
        })
    }

    fn report(
        &self,
        request_type: &'static str,
        name: &str,
        response_time_ms: f64,
        status: Option<u16>,
        error: Option<String>,
    ) {
        self.metrics.on_request(RequestEvent {
            request_type,
            name: name.to_owned(),
            response_time_ms,
            status,
            error,
        });
    }
}

fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        _ => "OTHER",
    }
}

/// "Expected 200/201, got 400 - <message>" with the body's `message` field
/// when it is JSON, otherwise a short raw preview.
pub fn describe_failure(expect: Expect, status: u16, body: &str) -> String {
    let wanted = match expect {
        Expect::Success => "200/201".to_string(),
        Expect::Status(code) => code.to_string(),
    };
    let detail = match serde_json::from_str::<Value>(body) {
        Ok(json) => json
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("No detail provided")
            .to_owned(),
        Err(_) => {
            let preview: String = body.chars().take(RAW_BODY_PREVIEW).collect();
            format!("Raw response: {preview}")
        }
    };
    format!("Expected {wanted}, got {status} - {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expectations() {
        assert!(Expect::Success.matches(200));
        assert!(Expect::Success.matches(201));
        assert!(!Expect::Success.matches(204));
        assert!(Expect::Status(401).matches(401));
        assert!(!Expect::Status(401).matches(200));
    }

    #[test]
    fn failure_messages() {
        let msg = describe_failure(Expect::Success, 400, r#"{"message":"email invalid"}"#);
        assert_eq!(msg, "Expected 200/201, got 400 - email invalid");

        let msg = describe_failure(Expect::Status(401), 500, r#"{"error":"x"}"#);
        assert_eq!(msg, "Expected 401, got 500 - No detail provided");

        let long = "x".repeat(500);
        let msg = describe_failure(Expect::Success, 502, &long);
        assert!(msg.starts_with("Expected 200/201, got 502 - Raw response: xxx"));
        assert_eq!(msg.matches('x').count(), RAW_BODY_PREVIEW + 1);
    }

    #[test]
    fn spec_builder() {
        let spec = RequestSpec::post("/auth/register", "register")
            .json(serde_json::json!({"email": "a@b.c"}))
            .expect(Expect::Status(201));
        assert_eq!(spec.method, Method::POST);
        assert_eq!(spec.name, "register");
        assert_eq!(spec.expect, Expect::Status(201));
        assert!(spec.body.is_some());
    }
}
