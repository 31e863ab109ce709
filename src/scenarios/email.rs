use async_trait::async_trait;
use chrono::Local;
use rand::Rng;
use serde_json::{json, Value};

use super::{unknown_task, ServiceBehavior, Session, TaskSpec};
use crate::client::RequestSpec;
use crate::error::HarnessResult;

const TASKS: &[TaskSpec] = &[
    TaskSpec {
        name: "workflow_success",
        weight: 2,
    },
    TaskSpec {
        name: "workflow_error",
        weight: 1,
    },
];

/// Drives the email service with workflow notifications. The token comes
/// from the user service (`auth_host`), not from the email host.
pub struct EmailBehavior;

#[async_trait]
impl ServiceBehavior for EmailBehavior {
    fn name(&self) -> &'static str {
        "email"
    }

    fn tasks(&self) -> &'static [TaskSpec] {
        TASKS
    }

    async fn on_start(&self, session: &mut Session) -> HarnessResult<()> {
        session.login("email_service_login").await
    }

    async fn execute(&self, task: &str, session: &mut Session) -> HarnessResult<()> {
        let (path, body) = match task {
            "workflow_success" => ("/email/workflow/success", workflow(session, None)),
            "workflow_error" => {
                let code = session.rng.gen_range(1000..=9999u32);
                ("/email/workflow/error", workflow(session, Some(code)))
            }
            other => return Err(unknown_task(self.name(), other)),
        };

        let headers = session.auth_headers()?;
        let spec = RequestSpec::post(path, task).json(body).headers(headers);
        session.client.send(spec).await?;
        Ok(())
    }
}

fn workflow(session: &mut Session, error_code: Option<u32>) -> Value {
    let n = session.rng.gen_range(1..=100u32);
    workflow_payload(n, error_code)
}

pub fn workflow_payload(n: u32, error_code: Option<u32>) -> Value {
    let mut body = json!({
        "workflowName": format!("workflow-{n}"),
        "timestamp": Local::now().to_rfc3339(),
    });
    if let Some(code) = error_code {
        body["errorDetails"] = Value::String(format!("Test error {code}"));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads() {
        let ok = workflow_payload(12, None);
        assert_eq!(ok["workflowName"], "workflow-12");
        assert!(ok.get("errorDetails").is_none());
        assert!(ok["timestamp"].as_str().is_some());

        let err = workflow_payload(3, Some(4242));
        assert_eq!(err["errorDetails"], "Test error 4242");
    }
}
