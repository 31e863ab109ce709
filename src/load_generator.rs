use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::client::{RetryPolicy, ServiceClient};
use crate::config::{Credentials, HarnessConfig, ServiceConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::metrics::MetricsAggregator;
use crate::scenarios::{user, Registry, ServiceBehavior, Session};

/// Everything a run needs, resolved from config up front so that unknown
/// behaviors fail before any user starts.
pub struct LoadPlan {
    pub users: u32,
    pub duration: Duration,
    pub wait_min: Duration,
    pub wait_max: Duration,
    pub setup_test_user: bool,
    pub credentials: Credentials,
    pub retry: RetryPolicy,
    pub services: Vec<(ServiceConfig, Arc<dyn ServiceBehavior>)>,
}

impl LoadPlan {
    pub fn from_config(config: &HarnessConfig, registry: &Registry) -> HarnessResult<Self> {
        Ok(Self {
            users: config.run.users,
            duration: config.duration(),
            wait_min: Duration::from_millis(config.run.wait_min_ms),
            wait_max: Duration::from_millis(config.run.wait_max_ms),
            setup_test_user: config.run.setup_test_user,
            credentials: config.credentials.clone(),
            retry: config.retry.policy(),
            services: registry.resolve(&config.services)?,
        })
    }
}

/// Think time and stop condition shared by every virtual user.
#[derive(Clone, Copy)]
struct Pace {
    wait_min_ms: u64,
    wait_max_ms: u64,
    deadline: Instant,
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns the planned virtual users and drives them until the deadline or
/// until `running` is set to false.
pub async fn run(
    running: Arc<AtomicBool>,
    metrics: Arc<MetricsAggregator>,
    plan: LoadPlan,
) -> HarnessResult<()> {
    let http = ServiceClient::build_http()?;

    if plan.setup_test_user {
        match plan.services.iter().find(|(_, b)| b.name() == "user") {
            Some((svc, _)) => {
                setup_test_user(&http, &svc.host).await;
            }
            None => warn!("setup_test_user set but no user service is configured"),
        }
    }

    for (svc, behavior) in &plan.services {
        behavior.announce(svc);
    }

    let weights: Vec<u32> = plan.services.iter().map(|(svc, _)| svc.weight).collect();
    let counts = distribute(plan.users, &weights);

    let wait_min_ms = plan.wait_min.as_millis() as u64;
    let pace = Pace {
        wait_min_ms,
        wait_max_ms: (plan.wait_max.as_millis() as u64).max(wait_min_ms),
        deadline: Instant::now() + plan.duration,
    };

    info!(
        users = plan.users,
        duration_secs = plan.duration.as_secs(),
        "starting virtual users"
    );

    let mut handles = Vec::with_capacity(plan.users as usize);
    let mut user_id = 0u64;

    for ((svc, behavior), count) in plan.services.iter().zip(counts) {
        debug!(service = %svc.name, users = count, "assigning users");
        for _ in 0..count {
            let session = Session {
                client: ServiceClient::new(&svc.host, http.clone(), metrics.clone()),
                auth_client: ServiceClient::new(svc.auth_host(), http.clone(), metrics.clone()),
                token: None,
                // Each user gets its own deterministic RNG seeded uniquely.
                rng: StdRng::seed_from_u64(1000 + user_id),
                credentials: plan.credentials.clone(),
                retry: plan.retry,
            };
            let running = running.clone();
            let behavior = behavior.clone();
            let id = user_id;

            handles.push(tokio::spawn(async move {
                virtual_user(id, running, behavior, session, pace).await;
            }));
            user_id += 1;
        }
    }

    // Wait for all users to finish
    for h in handles {
        if let Err(e) = h.await {
            error!(error = %e, "virtual user task panicked");
        }
    }

    // Mark run as finished
    running.store(false, Ordering::SeqCst);
    info!("all virtual users finished");
    Ok(())
}

/// Split `users` across services in proportion to `weights`, giving every
/// service at least one user when there are enough to go around.
pub fn distribute(users: u32, weights: &[u32]) -> Vec<u32> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    if users as usize <= n {
        return (0..n).map(|i| u32::from(i < users as usize)).collect();
    }

    let spare = u64::from(users) - n as u64;
    let total: u64 = weights.iter().map(|&w| u64::from(w.max(1))).sum();
    let share = |i: usize| spare * u64::from(weights[i].max(1));

    let mut counts: Vec<u32> = (0..n).map(|i| 1 + (share(i) / total) as u32).collect();
    let assigned: u32 = counts.iter().sum();

    // Largest remainder gets the leftovers.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(share(i) % total));
    for &i in order.iter().take((users - assigned) as usize) {
        counts[i] += 1;
    }
    counts
}

// ─── Virtual user loop ───────────────────────────────────────────

async fn virtual_user(
    id: u64,
    running: Arc<AtomicBool>,
    behavior: Arc<dyn ServiceBehavior>,
    mut session: Session,
    pace: Pace,
) {
    let tasks = behavior.tasks();
    let picker = match WeightedIndex::new(tasks.iter().map(|t| t.weight)) {
        Ok(p) => p,
        Err(e) => {
            error!(user = id, behavior = behavior.name(), error = %e, "behavior has no runnable tasks");
            return;
        }
    };

    if let Err(e) = behavior.on_start(&mut session).await {
        // Keep going; token-gated tasks will report the missing token.
        error!(user = id, behavior = behavior.name(), error = %e, "start hook failed");
    }

    while running.load(Ordering::Relaxed) && Instant::now() < pace.deadline {
        let task = tasks[picker.sample(&mut session.rng)].name;

        match behavior.execute(task, &mut session).await {
            Ok(()) => {}
            Err(HarnessError::MissingToken) => {
                warn!(user = id, task, "no authentication token available");
            }
            // Already recorded as a failed request.
            Err(HarnessError::Http { endpoint, source }) => {
                debug!(user = id, endpoint = %endpoint, error = %source, "request failed");
            }
            Err(e) => warn!(user = id, task, error = %e, "task failed"),
        }

        let wait_ms = session.rng.gen_range(pace.wait_min_ms..=pace.wait_max_ms);
        let left = pace.deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(Duration::from_millis(wait_ms).min(left)).await;
    }

    debug!(user = id, behavior = behavior.name(), "virtual user done");
}

// ─── Test data ───────────────────────────────────────────────────

/// Register `test@example.com` ahead of the run. 201 (created) and 409
/// (already there) both leave the user in place. Not recorded as load.
async fn setup_test_user(http: &reqwest::Client, host: &str) -> bool {
    let url = format!("{}/auth/register", host.trim_end_matches('/'));
    let body = user::registration("test@example.com", "USER");

    match http.post(&url).json(&body).send().await {
        Ok(resp) if matches!(resp.status().as_u16(), 201 | 409) => {
            info!(status = resp.status().as_u16(), "test user setup complete");
            true
        }
        Ok(resp) => {
            error!(status = resp.status().as_u16(), "failed to set up test user");
            false
        }
        Err(e) => {
            error!(error = %e, "error setting up test user");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_service_gets_a_user() {
        assert_eq!(distribute(10, &[1, 1]), vec![5, 5]);
        assert_eq!(distribute(10, &[3, 1]), vec![7, 3]);
        assert_eq!(distribute(3, &[1, 1, 1]), vec![1, 1, 1]);
        assert_eq!(distribute(2, &[100, 1]), vec![1, 1]);
    }

    #[test]
    fn distribution_sums_to_users() {
        for users in 1..50 {
            for weights in [&[1u32][..], &[1, 2][..], &[5, 1, 1][..], &[2, 2, 3, 7][..]] {
                let counts = distribute(users, weights);
                assert_eq!(counts.iter().sum::<u32>(), users, "{users} {weights:?}");
                if users as usize >= weights.len() {
                    assert!(counts.iter().all(|&c| c >= 1));
                }
            }
        }
    }

    #[test]
    fn too_few_users_fill_in_order() {
        assert_eq!(distribute(1, &[1, 1, 1]), vec![1, 0, 0]);
        assert!(distribute(5, &[]).is_empty());
    }

    #[test]
    fn plan_rejects_unknown_behavior() {
        let mut cfg = HarnessConfig::default();
        cfg.services[0].behavior = Some("missing".into());
        assert!(matches!(
            LoadPlan::from_config(&cfg, &Registry::builtin()),
            Err(HarnessError::UnknownBehavior(_))
        ));
    }
}
