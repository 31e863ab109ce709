use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{MockError, MockState};

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
}

/// `local@domain.tld`, loosely.
pub fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

// ─── POST /auth/login ────────────────────────────────────────────

pub async fn login(
    State(state): State<Arc<MockState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, MockError> {
    if !valid_email(&req.email) || req.password.is_empty() {
        return Err(MockError::BadRequest("email must be valid and password non-empty".into()));
    }

    let known = state.users.lock().get(&req.email) == Some(&req.password);
    if !known {
        return Err(MockError::Unauthorized("Invalid credentials".into()));
    }

    let token = Uuid::new_v4().simple().to_string();
    state.tokens.lock().insert(token.clone(), req.email);

    Ok(Json(LoginResponse {
        access_token: token,
        token_type: "bearer",
    }))
}

// ─── POST /auth/register ─────────────────────────────────────────

pub async fn register(
    State(state): State<Arc<MockState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), MockError> {
    if !valid_email(&req.email) || req.password.is_empty() {
        return Err(MockError::BadRequest("email must be valid and password non-empty".into()));
    }

    let mut users = state.users.lock();
    if users.contains_key(&req.email) {
        return Err(MockError::Conflict(format!("{} is already registered", req.email)));
    }
    users.insert(req.email.clone(), req.password);

    let body = serde_json::json!({
        "id": format!("usr_{}", &Uuid::new_v4().simple().to_string()[..8]),
        "email": req.email,
        "firstName": req.first_name,
        "lastName": req.last_name,
        "roles": req.roles,
    });
    Ok((StatusCode::CREATED, Json(body)))
}

// ─── GET /users/profile ──────────────────────────────────────────

pub async fn profile(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> Result<Json<Profile>, MockError> {
    let email = state
        .bearer_owner(&headers)
        .ok_or_else(|| MockError::Unauthorized("Unauthorized".into()))?;

    Ok(Json(Profile {
        id: format!("usr_{:08x}", email.len()),
        email,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(valid_email("admin@example.com"));
        assert!(!valid_email("invalid-email"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("a@localhost"));
        assert!(!valid_email(""));
    }
}
