use chrono::Local;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::retry::RetryPolicy;
use super::{RequestSpec, ServiceClient};
use crate::config::Credentials;
use crate::error::{HarnessError, HarnessResult};

pub const LOGIN_PATH: &str = "/auth/login";

/// Bearer token issued by the user service.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep tokens out of logs.
impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(..)")
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
}

fn token_from_body(body: &str) -> Result<String, String> {
    let parsed: LoginResponse =
        serde_json::from_str(body).map_err(|e| format!("Invalid JSON response: {e}"))?;
    match parsed.access_token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err("No access token in response".into()),
    }
}

/// Log in with `credentials`, retrying under `policy`.
///
/// Each attempt is reported as a request named `name`; an attempt only
/// succeeds on a 200 whose JSON body carries a non-empty `access_token`.
pub async fn login(
    client: &ServiceClient,
    credentials: &Credentials,
    name: &str,
    policy: &RetryPolicy,
) -> HarnessResult<AuthToken> {
    let body = serde_json::json!({
        "email": credentials.email,
        "password": credentials.password,
    });

    let result = policy
        .run(name, |attempt| {
            let spec = RequestSpec::post(LOGIN_PATH, name).json(body.clone());
            async move {
                let outcome = client
                    .send_checked(spec, |status, body| {
                        if status != 200 {
                            return Err(format!("Login failed with status {status}"));
                        }
                        token_from_body(body).map(|_| ())
                    })
                    .await
                    .map_err(|e| e.to_string())?;

                if !outcome.ok {
                    return Err(match outcome.status {
                        200 => token_from_body(&outcome.body)
                            .err()
                            .unwrap_or_else(|| "login rejected".into()),
                        status => format!("Login failed with status {status}"),
                    });
                }
                let token = token_from_body(&outcome.body)?;
                info!(endpoint = name, attempt = attempt + 1, "logged in");
                Ok(AuthToken::new(token))
            }
        })
        .await;

    result.map_err(|(attempts, reason)| {
        warn!(endpoint = name, attempts, "all login attempts failed");
        HarnessError::AuthFailed { attempts, reason }
    })
}

/// Headers for authenticated calls; empty when there is no token, so a
/// caller can bail out the way it would for a missing token.
pub fn auth_headers(token: Option<&AuthToken>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let Some(token) = token else {
        return headers;
    };

    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {}", token.as_str())) {
        headers.insert(AUTHORIZATION, val);
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = request_id().parse() {
        headers.insert("x-request-id", val);
    }
    headers
}

/// `YYYYmmddHHMMSS-xxxxxxxx`: timestamp plus a random suffix.
pub fn request_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Local::now().format("%Y%m%d%H%M%S"), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_parsing() {
        assert_eq!(token_from_body(r#"{"access_token":"abc"}"#), Ok("abc".into()));
        assert_eq!(
            token_from_body(r#"{"access_token":""}"#),
            Err("No access token in response".into())
        );
        assert_eq!(
            token_from_body(r#"{"user":1}"#),
            Err("No access token in response".into())
        );
        assert!(token_from_body("<html>").unwrap_err().starts_with("Invalid JSON"));
    }

    #[test]
    fn headers_require_a_token() {
        assert!(auth_headers(None).is_empty());

        let token = AuthToken::new("tok123");
        let headers = auth_headers(Some(&token));
        assert_eq!(headers[AUTHORIZATION], "Bearer tok123");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert!(headers.contains_key("x-request-id"));
    }

    #[test]
    fn request_ids_are_timestamped() {
        let id = request_id();
        let (stamp, suffix) = id.split_once('-').unwrap();
        assert_eq!(stamp.len(), 14);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn token_debug_is_redacted() {
        assert_eq!(format!("{:?}", AuthToken::new("secret")), "AuthToken(..)");
    }
}
