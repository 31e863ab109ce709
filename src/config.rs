//! Harness configuration.
//!
//! Loaded from an optional TOML file, then overridden from the command line,
//! then validated. Every field has a default so an empty file (or no file)
//! targets the user service on :3001 and the email service on :3005.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::retry::RetryPolicy;
use crate::dashboard::OutputMode;
use crate::error::{HarnessError, HarnessResult};
use crate::metrics::recorder::DEFAULT_HISTORY;
use crate::metrics::window::DEFAULT_WINDOW;

#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default = "default_services")]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Number of concurrent virtual users
    #[serde(default = "default_users")]
    pub users: u32,

    /// How long the run lasts (seconds)
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Think time between tasks, drawn uniformly from [min, max]
    #[serde(default = "default_wait_min")]
    pub wait_min_ms: u64,
    #[serde(default = "default_wait_max")]
    pub wait_max_ms: u64,

    /// Register `test@example.com` on the user service before the run
    #[serde(default)]
    pub setup_test_user: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Response times kept per endpoint
    #[serde(default = "default_history")]
    pub history: usize,

    /// Samples kept per resource series
    #[serde(default = "default_window")]
    pub window: usize,

    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,

    /// Live dashboard every N requests (0 disables live frames)
    #[serde(default = "default_render_every")]
    pub render_every: u64,

    #[serde(default)]
    pub output: OutputMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// One target service and the behavior that drives it.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub host: String,

    /// Registry key; defaults to `name`
    #[serde(default)]
    pub behavior: Option<String>,

    /// Relative share of virtual users
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Where to log in, when it is not `host` itself
    #[serde(default)]
    pub auth_host: Option<String>,
}

fn default_users() -> u32 {
    10
}
fn default_duration() -> u64 {
    60
}
fn default_wait_min() -> u64 {
    1_000
}
fn default_wait_max() -> u64 {
    3_000
}
fn default_history() -> usize {
    DEFAULT_HISTORY
}
fn default_window() -> usize {
    DEFAULT_WINDOW
}
fn default_sample_interval() -> u64 {
    1_000
}
fn default_render_every() -> u64 {
    5
}
fn default_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1_000
}
fn default_max_delay() -> u64 {
    10_000
}
fn default_weight() -> u32 {
    1
}

fn default_services() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig {
            name: "user".into(),
            host: "http://localhost:3001".into(),
            behavior: None,
            weight: 1,
            auth_host: None,
        },
        ServiceConfig {
            name: "email".into(),
            host: "http://localhost:3005".into(),
            behavior: None,
            weight: 1,
            auth_host: Some("http://localhost:3001".into()),
        },
    ]
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
            duration_secs: default_duration(),
            wait_min_ms: default_wait_min(),
            wait_max_ms: default_wait_max(),
            setup_test_user: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            history: default_history(),
            window: default_window(),
            sample_interval_ms: default_sample_interval(),
            render_every: default_render_every(),
            output: OutputMode::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            email: "admin@example.com".into(),
            password: "AdminPassword123!".into(),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            metrics: MetricsConfig::default(),
            retry: RetryConfig::default(),
            credentials: Credentials::default(),
            services: default_services(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

impl ServiceConfig {
    pub fn behavior_key(&self) -> &str {
        self.behavior.as_deref().unwrap_or(&self.name)
    }

    pub fn auth_host(&self) -> &str {
        self.auth_host.as_deref().unwrap_or(&self.host)
    }
}

impl HarnessConfig {
    pub fn from_toml(text: &str) -> HarnessResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| HarnessError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        let bad = |msg: String| Err(HarnessError::Config(msg));

        if self.run.users == 0 || self.run.users > 1000 {
            return bad("run.users must be between 1 and 1000".into());
        }
        if self.run.duration_secs == 0 || self.run.duration_secs > 86_400 {
            return bad("run.duration_secs must be between 1 and 86400".into());
        }
        if self.run.wait_min_ms > self.run.wait_max_ms {
            return bad("run.wait_min_ms must not exceed run.wait_max_ms".into());
        }
        if self.retry.max_attempts == 0 {
            return bad("retry.max_attempts must be at least 1".into());
        }
        if self.metrics.sample_interval_ms == 0 {
            return bad("metrics.sample_interval_ms must be positive".into());
        }
        if self.services.is_empty() {
            return bad("at least one [[services]] entry is required".into());
        }
        for svc in &self.services {
            if svc.name.trim().is_empty() {
                return bad("service name is required".into());
            }
            if svc.host.trim().is_empty() {
                return bad(format!("service `{}`: host is required", svc.name));
            }
            if !svc.host.starts_with("http://") && !svc.host.starts_with("https://") {
                return bad(format!(
                    "service `{}`: host must be an http(s) URL, got `{}`",
                    svc.name, svc.host
                ));
            }
            if svc.weight == 0 {
                return bad(format!("service `{}`: weight must be at least 1", svc.name));
            }
        }
        if self.services.len() > self.run.users as usize {
            return bad(format!(
                "{} services need at least as many users, got {}",
                self.services.len(),
                self.run.users
            ));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.run.duration_secs)
    }
}
