//! What each virtual user does against its target.
//!
//! A behavior is a fixed set of weighted tasks plus an optional start hook.
//! Behaviors are looked up by name from a static [`Registry`]; the config
//! chooses which ones run and with what share of users.

pub mod email;
pub mod error_simulation;
pub mod user;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use reqwest::header::HeaderMap;

use crate::client::{auth_headers, login, AuthToken, RetryPolicy, ServiceClient};
use crate::config::{Credentials, ServiceConfig};
use crate::error::{HarnessError, HarnessResult};

pub use email::EmailBehavior;
pub use error_simulation::ErrorSimulation;
pub use user::UserBehavior;

/// A task a behavior can run, with its relative pick weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: &'static str,
    pub weight: u32,
}

/// Per-virtual-user state handed to every task.
pub struct Session {
    /// Client for the service under test
    pub client: ServiceClient,
    /// Client for the service that issues tokens (may be the same host)
    pub auth_client: ServiceClient,
    pub token: Option<AuthToken>,
    pub rng: StdRng,
    pub credentials: Credentials,
    pub retry: RetryPolicy,
}

impl Session {
    /// Log in through the auth host and keep the token for later tasks.
    pub async fn login(&mut self, name: &str) -> HarnessResult<()> {
        let token = login(&self.auth_client, &self.credentials, name, &self.retry).await?;
        self.token = Some(token);
        Ok(())
    }

    /// Authenticated headers, or `MissingToken` when login never succeeded.
    pub fn auth_headers(&self) -> HarnessResult<HeaderMap> {
        match self.token.as_ref() {
            Some(token) => Ok(auth_headers(Some(token))),
            None => Err(HarnessError::MissingToken),
        }
    }
}

#[async_trait]
pub trait ServiceBehavior: Send + Sync {
    fn name(&self) -> &'static str;

    fn tasks(&self) -> &'static [TaskSpec];

    /// Logged once per configured service before users start.
    fn announce(&self, service: &ServiceConfig) {
        tracing::info!(
            service = %service.name,
            behavior = self.name(),
            host = %service.host,
            "target configured"
        );
    }

    async fn on_start(&self, _session: &mut Session) -> HarnessResult<()> {
        Ok(())
    }

    async fn execute(&self, task: &str, session: &mut Session) -> HarnessResult<()>;
}

pub(crate) fn unknown_task(behavior: &str, task: &str) -> HarnessError {
    HarnessError::UnknownTask {
        behavior: behavior.to_owned(),
        task: task.to_owned(),
    }
}

/// Name → behavior lookup.
pub struct Registry {
    behaviors: BTreeMap<&'static str, Arc<dyn ServiceBehavior>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            behaviors: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(UserBehavior));
        registry.register(Arc::new(EmailBehavior));
        registry.register(Arc::new(ErrorSimulation));
        registry
    }

    pub fn register(&mut self, behavior: Arc<dyn ServiceBehavior>) {
        self.behaviors.insert(behavior.name(), behavior);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ServiceBehavior>> {
        self.behaviors.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.behaviors.keys().copied()
    }

    /// Pair every configured service with its behavior.
    pub fn resolve(
        &self,
        services: &[ServiceConfig],
    ) -> HarnessResult<Vec<(ServiceConfig, Arc<dyn ServiceBehavior>)>> {
        services
            .iter()
            .map(|svc| {
                self.get(svc.behavior_key())
                    .map(|behavior| (svc.clone(), behavior))
                    .ok_or_else(|| HarnessError::UnknownBehavior(svc.behavior_key().to_owned()))
            })
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;

    #[test]
    fn builtin_names() {
        let names: Vec<_> = Registry::builtin().names().collect();
        assert_eq!(names, vec!["email", "error_simulation", "user"]);
    }

    #[test]
    fn resolves_default_services() {
        let cfg = HarnessConfig::default();
        let resolved = Registry::builtin().resolve(&cfg.services).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].1.name(), "user");
        assert_eq!(resolved[1].1.name(), "email");
    }

    #[test]
    fn rejects_unknown_behavior() {
        let mut cfg = HarnessConfig::default();
        cfg.services[1].behavior = Some("sms".into());
        match Registry::builtin().resolve(&cfg.services) {
            Err(HarnessError::UnknownBehavior(name)) => assert_eq!(name, "sms"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("sms should not resolve"),
        }
    }

    #[test]
    fn task_weights() {
        let weights = |b: &dyn ServiceBehavior| -> Vec<(&'static str, u32)> {
            b.tasks().iter().map(|t| (t.name, t.weight)).collect()
        };
        assert_eq!(weights(&UserBehavior), vec![("get_profile", 3), ("register", 1)]);
        assert_eq!(
            weights(&EmailBehavior),
            vec![("workflow_success", 2), ("workflow_error", 1)]
        );
        assert!(ErrorSimulation.tasks().iter().all(|t| t.weight == 1));
    }
}
