use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};

use super::{unknown_task, ServiceBehavior, Session, TaskSpec};
use crate::client::RequestSpec;
use crate::error::HarnessResult;

const TASKS: &[TaskSpec] = &[
    TaskSpec {
        name: "get_profile",
        weight: 3,
    },
    TaskSpec {
        name: "register",
        weight: 1,
    },
];

/// Drives the user service: log in once, then mostly read the profile and
/// occasionally register a fresh account.
pub struct UserBehavior;

#[async_trait]
impl ServiceBehavior for UserBehavior {
    fn name(&self) -> &'static str {
        "user"
    }

    fn tasks(&self) -> &'static [TaskSpec] {
        TASKS
    }

    async fn on_start(&self, session: &mut Session) -> HarnessResult<()> {
        session.login("login").await
    }

    async fn execute(&self, task: &str, session: &mut Session) -> HarnessResult<()> {
        match task {
            "get_profile" => {
                let headers = session.auth_headers()?;
                let spec = RequestSpec::get("/users/profile", "get_profile").headers(headers);
                session.client.send(spec).await?;
                Ok(())
            }
            "register" => {
                let id = session.rng.gen_range(1..=10_000u32);
                let spec = RequestSpec::post("/auth/register", "register")
                    .json(registration(&format!("newuser{id}@example.com"), "staff"));
                session.client.send(spec).await?;
                Ok(())
            }
            other => Err(unknown_task(self.name(), other)),
        }
    }
}

/// Registration payload for a throwaway account.
pub fn registration(email: &str, role: &str) -> Value {
    json!({
        "email": email,
        "password": "password123",
        "firstName": "Test",
        "lastName": "User",
        "roles": [role],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_payload() {
        let body = registration("newuser7@example.com", "staff");
        assert_eq!(body["email"], "newuser7@example.com");
        assert_eq!(body["roles"], json!(["staff"]));
        assert_eq!(body["firstName"], "Test");
    }
}
