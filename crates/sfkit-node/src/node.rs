//! Per-node bootstrap sequence.
//!
//!   setup → listener → readiness barrier → all_vms_are_ready → phases
//!
//! The listener is started only after setup succeeds, so a peer that can
//! connect to it knows this node is prepared. It keeps running after the
//! phases finish; the caller decides when to shut it down.
//!
//! In validation mode the node instead runs its counting command, reports
//! the count and stops, without setup, listener or barrier.

use std::sync::Arc;

use sfkit_core::{
    await_all, run_setup, run_validation, CommandPublisher, ListenerHandle, LogPublisher, PhaseLauncher, Probe,
    ProcessRunner, Publisher, ReadinessListener, Reporter, SystemRunner, TcpProbe,
};
use sfkit_proto::{BootError, BootResult, Checkpoint, PhaseState};
use tokio::sync::watch;
use tracing::info;

use crate::config::{NodeConfig, PublisherChoice};

pub struct Node {
    config: NodeConfig,
    runner: Arc<dyn ProcessRunner>,
    probe: Arc<dyn Probe>,
    publisher: Arc<dyn Publisher>,
}

/// A node whose sequence has finished; its listener is still serving.
pub struct Completed {
    pub state: PhaseState,
    pub listener: ListenerHandle,
}

impl Node {
    /// Node wired to real processes, TCP probes and the configured publisher.
    pub fn new(config: NodeConfig) -> Self {
        let publisher: Arc<dyn Publisher> = match &config.publisher {
            PublisherChoice::Log => Arc::new(LogPublisher),
            PublisherChoice::Gcloud { topic } => Arc::new(CommandPublisher::gcloud(
                topic,
                config.study.clone(),
                config.identity.clone(),
            )),
            PublisherChoice::Command { program, args } => Arc::new(CommandPublisher::new(
                program.clone(),
                args.clone(),
                config.study.clone(),
                config.identity.clone(),
            )),
        };
        Self::with_parts(config, Arc::new(SystemRunner), Arc::new(TcpProbe), publisher)
    }

    pub fn with_parts(
        config: NodeConfig,
        runner: Arc<dyn ProcessRunner>,
        probe: Arc<dyn Probe>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            config,
            runner,
            probe,
            publisher,
        }
    }

    /// Run the validation command and publish its count.
    pub async fn validate(self) -> BootResult<u64> {
        let step = self.config.validate.as_ref().ok_or_else(|| BootError::Config {
            message: "no validation command configured".to_string(),
        })?;
        info!(
            "role {}, identity '{}': validating local data",
            self.config.role, self.config.identity
        );
        let reporter = Reporter::new(self.publisher.clone());
        run_validation(step, self.runner.as_ref(), &reporter).await
    }

    pub async fn run(self) -> BootResult<Completed> {
        let cfg = &self.config;
        let role = cfg.role;
        info!(
            "role {} of {} ({}), identity '{}'",
            role,
            cfg.table.size(),
            if cfg.special() { "data holder" } else { "GWAS party" },
            cfg.identity
        );

        let reporter = Reporter::new(self.publisher.clone());

        run_setup(&cfg.setup, self.runner.as_ref(), &reporter).await?;

        let (state_tx, state_rx) = watch::channel(PhaseState::NotStarted);
        let listener =
            ReadinessListener::bind(&cfg.bind_addr, cfg.listen_port()?, role, state_rx).await?;
        let listener = listener.spawn()?;

        let peers = cfg.table.peers(role);
        info!("waiting for {} peers to become ready", peers.len());
        await_all(peers, self.probe.clone(), &cfg.policy).await?;
        info!("all peers are ready");
        reporter.checkpoint(Checkpoint::AllVmsAreReady).await;

        let mut launcher = PhaseLauncher::new(
            cfg.plan.clone(),
            role,
            cfg.special(),
            self.runner.clone(),
            reporter,
            state_tx,
        );
        let state = launcher.run().await?;
        info!("role {} finished: {}", role, state);

        Ok(Completed { state, listener })
    }
}
