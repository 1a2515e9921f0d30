//! Phase launcher.
//!
//! Runs once the readiness barrier is satisfied:
//!
//!   stagger(role) → Phase 1 → DataSharing_completed
//!     → special role: done
//!     → others: cooldown(role) → Phase 2 → GWAS_completed
//!
//! Each phase is an external process run to completion. A failed phase
//! ends the node's participation; nothing is retried.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sfkit_proto::defaults::*;
use sfkit_proto::role::render_role_template;
use sfkit_proto::{BootError, BootResult, Checkpoint, Phase, PhaseState, Role};
use tokio::sync::watch;
use tracing::{error, info};

use crate::process::{CommandSpec, ProcessRunner};
use crate::reporter::Reporter;

/// Program and leading arguments for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl PhaseCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

/// Deployment-wide launch parameters, identical on every node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub phase1: PhaseCommand,
    pub phase2: PhaseCommand,
    /// Per-role parameter file, `{role}` is substituted.
    pub param_file_template: String,
    /// Shared data directory, passed to Phase 1 by the special role only.
    pub data_dir: String,
    pub working_dir: Option<PathBuf>,
    pub stagger: Duration,
    pub cooldown_base: Duration,
    pub cooldown_step: Duration,
}

impl LaunchPlan {
    /// Stagger before Phase 1 for `role`.
    pub fn phase1_delay(&self, role: Role) -> BootResult<Duration> {
        self.stagger
            .checked_mul(u32::from(role.0))
            .ok_or_else(|| out_of_range("stagger", role))
    }

    /// Cooldown between the phases for `role`.
    pub fn cooldown(&self, role: Role) -> BootResult<Duration> {
        self.cooldown_step
            .checked_mul(u32::from(role.0))
            .and_then(|step| self.cooldown_base.checked_add(step))
            .ok_or_else(|| out_of_range("cooldown", role))
    }

    /// Check that every role of a cluster of `size` nodes gets a
    /// representable delay.
    pub fn check_delays(&self, size: usize) -> BootResult<()> {
        let last = Role(size.saturating_sub(1).min(usize::from(u16::MAX)) as u16);
        self.phase1_delay(last)?;
        self.cooldown(last)?;
        Ok(())
    }
}

fn out_of_range(what: &str, role: Role) -> BootError {
    BootError::Config {
        message: format!("{} for role {} is out of range", what, role),
    }
}

impl Default for LaunchPlan {
    fn default() -> Self {
        Self {
            phase1: PhaseCommand::new(DEFAULT_PHASE1_PROGRAM),
            phase2: PhaseCommand::new(DEFAULT_PHASE2_PROGRAM),
            param_file_template: DEFAULT_PARAM_FILE_TEMPLATE.to_string(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            working_dir: None,
            stagger: Duration::from_secs(DEFAULT_PHASE1_STAGGER_SECS),
            cooldown_base: Duration::from_secs(DEFAULT_COOLDOWN_BASE_SECS),
            cooldown_step: Duration::from_secs(DEFAULT_COOLDOWN_STEP_SECS),
        }
    }
}

pub struct PhaseLauncher {
    plan: LaunchPlan,
    role: Role,
    special: bool,
    runner: Arc<dyn ProcessRunner>,
    reporter: Reporter,
    state: watch::Sender<PhaseState>,
    current: PhaseState,
}

impl PhaseLauncher {
    pub fn new(
        plan: LaunchPlan,
        role: Role,
        special: bool,
        runner: Arc<dyn ProcessRunner>,
        reporter: Reporter,
        state: watch::Sender<PhaseState>,
    ) -> Self {
        let current = *state.borrow();
        Self {
            plan,
            role,
            special,
            runner,
            reporter,
            state,
            current,
        }
    }

    /// Command line for a phase as this role runs it.
    pub fn command_for(&self, phase: Phase) -> CommandSpec {
        let cmd = match phase {
            Phase::DataSharing => &self.plan.phase1,
            Phase::Gwas => &self.plan.phase2,
        };
        let mut spec = CommandSpec::new(cmd.program.clone())
            .args(cmd.args.iter().cloned())
            .arg(self.role.to_string())
            .arg(render_role_template(&self.plan.param_file_template, self.role))
            .current_dir(self.plan.working_dir.clone());
        if phase == Phase::DataSharing && self.special {
            spec = spec.arg(self.plan.data_dir.clone());
        }
        spec
    }

    pub fn phase1_delay(&self) -> BootResult<Duration> {
        self.plan.phase1_delay(self.role)
    }

    pub fn cooldown(&self) -> BootResult<Duration> {
        self.plan.cooldown(self.role)
    }

    /// Run the full sequence and return the final state.
    pub async fn run(&mut self) -> BootResult<PhaseState> {
        let delay = self.phase1_delay()?;
        let cooldown = self.cooldown()?;
        if !delay.is_zero() {
            info!("role {}: waiting {}s before data sharing", self.role, delay.as_secs());
            tokio::time::sleep(delay).await;
        }

        self.run_phase(Phase::DataSharing).await?;
        self.reporter.checkpoint(Checkpoint::DataSharingCompleted).await;

        if self.special {
            info!("role {} holds the data directory, skipping GWAS", self.role);
            return Ok(self.current);
        }

        self.advance(PhaseState::CoolingDown)?;
        info!("role {}: cooling down {}s before GWAS", self.role, cooldown.as_secs());
        tokio::time::sleep(cooldown).await;

        self.run_phase(Phase::Gwas).await?;
        self.reporter.checkpoint(Checkpoint::GwasCompleted).await;
        Ok(self.current)
    }

    async fn run_phase(&mut self, phase: Phase) -> BootResult<()> {
        let (running, done) = match phase {
            Phase::DataSharing => (PhaseState::Phase1Running, PhaseState::Phase1Done),
            Phase::Gwas => (PhaseState::Phase2Running, PhaseState::Phase2Done),
        };
        self.advance(running)?;

        let spec = self.command_for(phase);
        info!("starting {}: {}", phase, spec.display());

        let result = match self.runner.run(&spec).await {
            Ok(Some(0)) => Ok(()),
            Ok(code) => Err(BootError::PhaseProcessFailure { phase, code }),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!("{} finished", phase);
                self.advance(done)
            }
            Err(e) => {
                error!("{}", e);
                self.advance(PhaseState::Failed)?;
                Err(e)
            }
        }
    }

    fn advance(&mut self, next: PhaseState) -> BootResult<()> {
        self.current = self.current.transition(next)?;
        self.state.send_replace(self.current);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CapturedOutput;
    use crate::reporter::Publisher;
    use async_trait::async_trait;
    use sfkit_proto::PublishError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Records each command with the time it started; exits with the
    /// scripted code for its program (default 0).
    struct RecordingRunner {
        start: Instant,
        exits: HashMap<String, Option<i32>>,
        runs: Mutex<Vec<(Duration, CommandSpec)>>,
    }

    impl RecordingRunner {
        fn new(start: Instant) -> Self {
            Self {
                start,
                exits: HashMap::new(),
                runs: Mutex::new(Vec::new()),
            }
        }

        fn runs(&self) -> Vec<(Duration, CommandSpec)> {
            self.runs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn run(&self, spec: &CommandSpec) -> BootResult<Option<i32>> {
            self.runs
                .lock()
                .unwrap()
                .push((self.start.elapsed(), spec.clone()));
            Ok(self.exits.get(&spec.program).copied().unwrap_or(Some(0)))
        }

        async fn capture(&self, spec: &CommandSpec) -> BootResult<CapturedOutput> {
            let code = self.run(spec).await?;
            Ok(CapturedOutput {
                code,
                stdout: String::new(),
            })
        }
    }

    struct SpawnFailRunner;

    #[async_trait]
    impl ProcessRunner for SpawnFailRunner {
        async fn run(&self, spec: &CommandSpec) -> BootResult<Option<i32>> {
            Err(BootError::Spawn {
                what: spec.program.clone(),
                message: "No such file or directory".into(),
            })
        }

        async fn capture(&self, spec: &CommandSpec) -> BootResult<CapturedOutput> {
            self.run(spec).await.map(|code| CapturedOutput {
                code,
                stdout: String::new(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        fail: bool,
        published: Mutex<Vec<Checkpoint>>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, checkpoint: &Checkpoint) -> Result<(), PublishError> {
            self.published.lock().unwrap().push(checkpoint.clone());
            if self.fail {
                Err(PublishError::Unavailable("pubsub down".into()))
            } else {
                Ok(())
            }
        }
    }

    fn launcher(
        role: u16,
        special: bool,
        runner: Arc<dyn ProcessRunner>,
        publisher: Arc<RecordingPublisher>,
    ) -> (PhaseLauncher, watch::Receiver<PhaseState>) {
        let (tx, rx) = watch::channel(PhaseState::NotStarted);
        let launcher = PhaseLauncher::new(
            LaunchPlan::default(),
            Role(role),
            special,
            runner,
            Reporter::new(publisher),
            tx,
        );
        (launcher, rx)
    }

    #[test]
    fn test_only_special_role_passes_data_dir() {
        let start = Instant::now();
        let (regular, _) = launcher(1, false, Arc::new(RecordingRunner::new(start)), Default::default());
        let (special, _) = launcher(3, true, Arc::new(RecordingRunner::new(start)), Default::default());

        assert_eq!(
            regular.command_for(Phase::DataSharing).args,
            vec!["1", "../par/test.par.1.toml"]
        );
        assert_eq!(
            special.command_for(Phase::DataSharing).args,
            vec!["3", "../par/test.par.3.toml", "../data/"]
        );
        assert_eq!(
            regular.command_for(Phase::Gwas).args,
            vec!["1", "../par/test.par.1.toml"]
        );
        assert_eq!(special.command_for(Phase::Gwas).args.len(), 2);
    }

    #[test]
    fn test_fixed_args_come_first() {
        let start = Instant::now();
        let (tx, _rx) = watch::channel(PhaseState::NotStarted);
        let mut plan = LaunchPlan::default();
        plan.phase2.args = vec!["--threads".into(), "8".into()];
        let launcher = PhaseLauncher::new(
            plan,
            Role(0),
            false,
            Arc::new(RecordingRunner::new(start)),
            Reporter::new(Arc::new(RecordingPublisher::default())),
            tx,
        );
        assert_eq!(
            launcher.command_for(Phase::Gwas).args,
            vec!["--threads", "8", "0", "../par/test.par.0.toml"]
        );
    }

    #[test]
    fn test_delays_out_of_range() {
        let plan = LaunchPlan {
            stagger: Duration::from_secs(u64::MAX),
            ..LaunchPlan::default()
        };
        assert_eq!(plan.phase1_delay(Role(0)).unwrap(), Duration::ZERO);
        assert!(matches!(plan.phase1_delay(Role(2)), Err(BootError::Config { .. })));
        assert!(plan.check_delays(4).is_err());

        let plan = LaunchPlan {
            cooldown_base: Duration::from_secs(u64::MAX),
            ..LaunchPlan::default()
        };
        assert!(matches!(plan.cooldown(Role(1)), Err(BootError::Config { .. })));
        assert!(LaunchPlan::default().check_delays(4).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_stagger_fails_before_phase1() {
        let runner = Arc::new(RecordingRunner::new(Instant::now()));
        let (tx, rx) = watch::channel(PhaseState::NotStarted);
        let plan = LaunchPlan {
            stagger: Duration::from_secs(u64::MAX),
            ..LaunchPlan::default()
        };
        let mut l = PhaseLauncher::new(
            plan,
            Role(2),
            false,
            runner.clone(),
            Reporter::new(Arc::new(RecordingPublisher::default())),
            tx,
        );
        let err = l.run().await.unwrap_err();
        assert!(matches!(err, BootError::Config { .. }));
        assert!(runner.runs().is_empty());
        assert_eq!(*rx.borrow(), PhaseState::NotStarted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_node_schedule() {
        let start = Instant::now();
        let mut tasks = Vec::new();
        for role in 0..4u16 {
            let runner = Arc::new(RecordingRunner::new(start));
            let publisher = Arc::new(RecordingPublisher::default());
            let (mut l, _rx) = launcher(role, role == 3, runner.clone(), publisher.clone());
            tasks.push(tokio::spawn(async move {
                let final_state = l.run().await.unwrap();
                (role, final_state, runner.runs(), publisher)
            }));
        }

        for task in tasks {
            let (role, final_state, runs, publisher) = task.await.unwrap();
            let r = u64::from(role);
            let published = publisher.published.lock().unwrap().clone();

            assert_eq!(runs[0].0, Duration::from_secs(5 * r));
            assert_eq!(runs[0].1.program, DEFAULT_PHASE1_PROGRAM);

            if role == 3 {
                assert_eq!(final_state, PhaseState::Phase1Done);
                assert_eq!(runs.len(), 1);
                assert_eq!(published, vec![Checkpoint::DataSharingCompleted]);
            } else {
                assert_eq!(final_state, PhaseState::Phase2Done);
                assert_eq!(runs.len(), 2);
                assert_eq!(runs[1].1.program, DEFAULT_PHASE2_PROGRAM);
                assert_eq!(runs[1].0, Duration::from_secs(5 * r + 120 + 15 * r));
                assert_eq!(
                    published,
                    vec![Checkpoint::DataSharingCompleted, Checkpoint::GwasCompleted]
                );
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase1_failure_stops_sequence() {
        let mut runner = RecordingRunner::new(Instant::now());
        runner.exits.insert(DEFAULT_PHASE1_PROGRAM.into(), Some(2));
        let runner = Arc::new(runner);
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut l, rx) = launcher(0, false, runner.clone(), publisher.clone());

        let err = l.run().await.unwrap_err();
        assert_eq!(
            err,
            BootError::PhaseProcessFailure {
                phase: Phase::DataSharing,
                code: Some(2)
            }
        );
        assert_eq!(*rx.borrow(), PhaseState::Failed);
        assert_eq!(runner.runs().len(), 1);
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase1_killed_by_signal() {
        let mut runner = RecordingRunner::new(Instant::now());
        runner.exits.insert(DEFAULT_PHASE1_PROGRAM.into(), None);
        let (mut l, rx) = launcher(1, false, Arc::new(runner), Default::default());

        let err = l.run().await.unwrap_err();
        assert!(matches!(
            err,
            BootError::PhaseProcessFailure { code: None, .. }
        ));
        assert_eq!(*rx.borrow(), PhaseState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase2_failure_is_fatal() {
        let mut runner = RecordingRunner::new(Instant::now());
        runner.exits.insert(DEFAULT_PHASE2_PROGRAM.into(), Some(1));
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut l, _rx) = launcher(2, false, Arc::new(runner), publisher.clone());

        let err = l.run().await.unwrap_err();
        assert!(matches!(
            err,
            BootError::PhaseProcessFailure {
                phase: Phase::Gwas,
                ..
            }
        ));
        assert_eq!(
            *publisher.published.lock().unwrap(),
            vec![Checkpoint::DataSharingCompleted]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_failure_is_fatal() {
        let (mut l, rx) = launcher(0, false, Arc::new(SpawnFailRunner), Default::default());
        let err = l.run().await.unwrap_err();
        assert!(matches!(err, BootError::Spawn { .. }));
        assert_eq!(*rx.borrow(), PhaseState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_does_not_change_sequence() {
        let start = Instant::now();
        let runner = Arc::new(RecordingRunner::new(start));
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        });
        let (mut l, _rx) = launcher(1, false, runner.clone(), publisher.clone());

        assert_eq!(l.run().await.unwrap(), PhaseState::Phase2Done);
        let runs = runner.runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].0, Duration::from_secs(5 + 120 + 15));
        assert_eq!(publisher.published.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_published_while_running() {
        struct Observing {
            rx: watch::Receiver<PhaseState>,
            seen: Mutex<Vec<PhaseState>>,
        }

        #[async_trait]
        impl ProcessRunner for Observing {
            async fn run(&self, _spec: &CommandSpec) -> BootResult<Option<i32>> {
                self.seen.lock().unwrap().push(*self.rx.borrow());
                Ok(Some(0))
            }

            async fn capture(&self, _spec: &CommandSpec) -> BootResult<CapturedOutput> {
                Ok(CapturedOutput {
                    code: Some(0),
                    stdout: String::new(),
                })
            }
        }

        let (tx, rx) = watch::channel(PhaseState::NotStarted);
        let observer = Arc::new(Observing {
            rx: rx.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let mut l = PhaseLauncher::new(
            LaunchPlan::default(),
            Role(0),
            false,
            observer.clone(),
            Reporter::new(Arc::new(RecordingPublisher::default())),
            tx,
        );
        l.run().await.unwrap();

        assert_eq!(
            *observer.seen.lock().unwrap(),
            vec![PhaseState::Phase1Running, PhaseState::Phase2Running]
        );
        assert_eq!(*rx.borrow(), PhaseState::Phase2Done);
    }
}
