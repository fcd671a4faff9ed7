pub mod config;
pub mod flow;
pub mod logging_system;
pub mod service;
pub mod shutdown;
pub mod supervisor;

pub use config::{AgentConfig, Cli, ConfigError, FlowConfig, LogLevel, MainConfig};
pub use flow::{Flow, FlowStats, FlowStatsSnapshot, Scheduler};
pub use logging_system::{LoggingSystem, setup_logging};
pub use service::ServiceError;
pub use supervisor::Supervisor;

use crate::metadata::{MetadataClient, StreamVars};
use crate::sender::LogService;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct App {
    config: AgentConfig,
    service: Arc<dyn LogService>,
    vars: StreamVars,
}

impl App {
    /// Builds the shared clients. Nothing listens yet.
    pub async fn from_config(config: AgentConfig) -> Result<Self, ServiceError> {
        let metadata = MetadataClient::new()?;
        let region = service::resolve_region(&config.main, &metadata).await?;
        let log_service = service::build_log_service(&config.main, &region, &metadata).await?;
        let vars = StreamVars::lookup(&metadata).await;
        info!(
            "stream variables: instance_id={} hostname={}",
            vars.instance_id, vars.hostname
        );
        Ok(Self::with_service(config, log_service, vars))
    }

    pub fn with_service(config: AgentConfig, service: Arc<dyn LogService>, vars: StreamVars) -> Self {
        Self {
            config,
            service,
            vars,
        }
    }

    /// Starts every flow; a flow that cannot start closes the ones already
    /// listening and fails the whole agent.
    pub async fn start(&self) -> Result<Supervisor, ServiceError> {
        let mut supervisor = Supervisor::new();
        for flow_config in &self.config.flows {
            let started = match service::build_flow(flow_config, &self.vars, self.service.clone()) {
                Ok((receiver, flow)) => supervisor.start_flow(receiver, flow).await,
                Err(e) => Err(e),
            };
            if let Err(e) = started {
                supervisor.close_all();
                return Err(e);
            }
        }
        Ok(supervisor)
    }

    /// Runs until `shutdown` is cancelled and every flow has drained.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        let supervisor = self.start().await?;
        info!(
            "rask-logs-agent v{} running {} flows",
            env!("CARGO_PKG_VERSION"),
            supervisor.flow_count()
        );
        let mut total = FlowStatsSnapshot::default();
        for (_, stats) in supervisor.run(shutdown).await {
            total += stats.snapshot();
        }
        info!(
            "rask-logs-agent stopped: received={} uploaded={} dropped={} evicted={} discarded={}",
            total.received, total.uploaded, total.dropped, total.evicted, total.discarded
        );
        Ok(())
    }
}

pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = match Cli::from_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rask-logs-agent: {e}");
            process::exit(1);
        }
    };

    if cli.check {
        println!(
            "{}: configuration OK ({} flows)",
            cli.config_file.display(),
            config.flows.len()
        );
        return Ok(());
    }

    if let Err(e) = setup_logging(&config.main) {
        eprintln!("rask-logs-agent: {e}");
        process::exit(1);
    }

    let shutdown = CancellationToken::new();
    let signals = shutdown::spawn_signal_listener(shutdown.clone());

    let result = match App::from_config(config).await {
        Ok(app) => app.run(shutdown.clone()).await,
        Err(e) => Err(e),
    };
    shutdown.cancel();
    let _ = signals.await;

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
    Ok(())
}
