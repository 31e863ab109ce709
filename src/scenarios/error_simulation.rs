//! Deliberate error traffic.
//!
//! Each request carries a payload chosen to provoke a known status, and is
//! counted as a success only when that status comes back. Login goes to the
//! auth host, notifications to the service host.

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use tracing::info;

use super::{unknown_task, ServiceBehavior, Session, TaskSpec};
use crate::client::{Expect, RequestSpec};
use crate::config::{Credentials, ServiceConfig};
use crate::error::HarnessResult;

const TASKS: &[TaskSpec] = &[
    TaskSpec {
        name: "auth_login_mix",
        weight: 1,
    },
    TaskSpec {
        name: "email_grafananotif",
        weight: 1,
    },
];

pub const AUTH_PATH: &str = "/auth/login";
pub const NOTIFY_PATH: &str = "/email/grafananotif";

pub struct ErrorSimulation;

/// Status to provoke from the login endpoint for a roll in `0..100`:
/// 40% 400, 40% 401, 20% 200.
pub fn auth_status(roll: u32) -> u16 {
    match roll {
        0..=39 => 400,
        40..=79 => 401,
        _ => 200,
    }
}

/// Status to provoke from the notification endpoint: 50% 400, 50% 200.
pub fn notify_status(roll: u32) -> u16 {
    if roll < 50 {
        400
    } else {
        200
    }
}

/// Login body for the wanted status; the 200 case uses the run's own
/// credentials.
pub fn auth_payload(status: u16, credentials: &Credentials) -> Value {
    match status {
        400 => json!({"email": "invalid-email", "password": ""}),
        401 => json!({"email": "wrong@example.com", "password": "wrongpassword"}),
        _ => json!({"email": credentials.email, "password": credentials.password}),
    }
}

pub fn notify_payload(status: u16) -> Value {
    match status {
        400 => json!({"to": "", "subject": "", "body": ""}),
        _ => json!({
            "to": "user@example.com",
            "subject": "Test Alert",
            "body": "This is a test alert",
        }),
    }
}

#[async_trait]
impl ServiceBehavior for ErrorSimulation {
    fn name(&self) -> &'static str {
        "error_simulation"
    }

    fn tasks(&self) -> &'static [TaskSpec] {
        TASKS
    }

    fn announce(&self, service: &ServiceConfig) {
        info!(
            service = %service.name,
            auth_host = service.auth_host(),
            notify_host = %service.host,
            "error simulation targets: login 400 40%, login 401 40%, notification 400 50%"
        );
    }

    async fn execute(&self, task: &str, session: &mut Session) -> HarnessResult<()> {
        let roll = session.rng.gen_range(0..100u32);
        match task {
            "auth_login_mix" => {
                let status = auth_status(roll);
                let spec = RequestSpec::post(AUTH_PATH, AUTH_PATH)
                    .json(auth_payload(status, &session.credentials))
                    .expect(Expect::Status(status));
                session.auth_client.send(spec).await?;
            }
            "email_grafananotif" => {
                let status = notify_status(roll);
                let spec = RequestSpec::post(NOTIFY_PATH, NOTIFY_PATH)
                    .json(notify_payload(status))
                    .expect(Expect::Status(status));
                session.client.send(spec).await?;
            }
            other => return Err(unknown_task(self.name(), other)),
        }
        Ok(())
    }
}
