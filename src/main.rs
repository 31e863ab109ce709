use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use service_loadtest::config::{Credentials, HarnessConfig};
use service_loadtest::load_generator::{self, LoadPlan};
use service_loadtest::metrics::MetricsAggregator;
use service_loadtest::mock::{self, MockState};
use service_loadtest::scenarios::Registry;

/// Load-test harness command line interface
#[derive(Parser)]
#[command(name = "service-loadtest")]
#[command(about = "Drive virtual users against the user and email services and report live metrics")]
#[command(version)]
struct Cli {
    /// Log level (RUST_LOG overrides)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of virtual users
        #[arg(short, long)]
        users: Option<u32>,

        /// Run length in seconds
        #[arg(short, long)]
        duration_secs: Option<u64>,

        /// Live dashboard every N requests (0 disables)
        #[arg(long)]
        render_every: Option<u64>,
    },

    /// Serve mock user and email services
    Mock {
        /// Configuration file whose [credentials] the mock accepts
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to listen on; repeat to serve several ports
        #[arg(long, default_values = ["127.0.0.1:3001", "127.0.0.1:3005"])]
        bind: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;

    match cli.command {
        Commands::Run {
            config,
            users,
            duration_secs,
            render_every,
        } => {
            let mut cfg = load_configuration(config.as_deref())?;
            if let Some(users) = users {
                cfg.run.users = users;
            }
            if let Some(secs) = duration_secs {
                cfg.run.duration_secs = secs;
            }
            if let Some(n) = render_every {
                cfg.metrics.render_every = n;
            }
            cfg.validate().context("invalid configuration")?;
            run_load_test(cfg).await
        }
        Commands::Mock { config, bind } => {
            let cfg = load_configuration(config.as_deref())?;
            serve_mocks(&cfg.credentials, &bind).await
        }
    }
}

/// Initialize logging based on command line flags. Logs go to stderr so they
/// do not interleave with the dashboard on stdout.
fn initialize_logging(cli: &Cli) -> Result<()> {
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("service_loadtest={log_level}").parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

/// Load configuration from file or defaults
fn load_configuration(path: Option<&std::path::Path>) -> Result<HarnessConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            HarnessConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))
        }
        None => {
            info!("No configuration file given, using defaults");
            Ok(HarnessConfig::default())
        }
    }
}

async fn run_load_test(cfg: HarnessConfig) -> Result<()> {
    let plan = LoadPlan::from_config(&cfg, &Registry::builtin())?;
    let aggregator = Arc::new(MetricsAggregator::from_config(&cfg.metrics));
    let running = Arc::new(AtomicBool::new(true));

    {
        let running = running.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping virtual users");
                running.store(false, Ordering::SeqCst);
            }
        });
    }

    aggregator.start();
    let outcome = load_generator::run(running, aggregator.clone(), plan).await;
    aggregator.stop().await;

    outcome.context("load test failed")
}

async fn serve_mocks(credentials: &Credentials, binds: &[String]) -> Result<()> {
    let state = Arc::new(MockState::seeded(credentials));

    let mut servers = Vec::with_capacity(binds.len());
    for addr in binds {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let shutdown = async {
            let _ = signal::ctrl_c().await;
        };
        servers.push(tokio::spawn(mock::serve(listener, state.clone(), shutdown)));
    }

    for server in servers {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "mock server failed"),
            Err(e) => error!(error = %e, "mock server task panicked"),
        }
    }
    info!("mock targets stopped");
    Ok(())
}
