//! Sequential multi-target render orchestration.
//!
//! A run takes one timeline and a selection of targets and renders the
//! targets strictly one after another:
//!
//! ```text
//! Idle ── start_run ──► Preparing(t) ── prepare ok ──► AwaitingJob(t)
//!                           │                               │ completion / cancel
//!                      prepare err                          ▼
//!                           │                        Finalizing(t, result)
//!                           ▼                          │            │
//!                       Done(false) ◄── err / failed ──┘            │ ok, more targets
//!                           │                                       ▼
//!                           ▼                                  Preparing(t+1)
//!                         Idle ◄── Done(true) ◄── ok, queue empty
//! ```
//!
//! Only one target is ever in flight, because every pass mutates the
//! shared timeline and view state. Every failure ends the run; the run
//! always ends with exactly one [`RunOutcome`] delivered through the
//! [`CompletionNotifier`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use seqsynth_common::config::RendererDefaults;
use seqsynth_common::error::{RenderError, RenderResult};
use seqsynth_common::paths::default_pipeline_config_path;
use seqsynth_sequence_model::{SharedViewState, TextureStyle, TextureStyleManager, Timeline, TimelineHandle};

use crate::host::{
    ConfigLoader, JobConfiguration, JobExecutor, JobOutcome, RenderJob, Scheduler, TokioScheduler,
};
use crate::mutator::{MutatorProvider, SceneMutator, StandardMutators};
use crate::notifier::{CompletionNotifier, RunOutcome};
use crate::target::{select_targets, RenderQueue, TargetDescriptor, TargetKind, TargetParams, TargetSelection};

/// Host capabilities the renderer is built on.
#[derive(Clone)]
pub struct HostServices {
    pub executor: Arc<dyn JobExecutor>,
    pub scheduler: Arc<dyn Scheduler>,
    pub configs: Arc<dyn ConfigLoader>,
    pub mutators: Arc<dyn MutatorProvider>,
}

impl HostServices {
    /// Services with the tokio scheduler and the standard mutators.
    pub fn new(executor: Arc<dyn JobExecutor>, configs: Arc<dyn ConfigLoader>) -> Self {
        Self {
            executor,
            scheduler: Arc::new(TokioScheduler),
            configs,
            mutators: Arc::new(StandardMutators),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_mutators(mut self, mutators: Arc<dyn MutatorProvider>) -> Self {
        self.mutators = mutators;
        self
    }
}

/// Renderer settings.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Pause between preparing a target and submitting its job, letting
    /// an interactive host settle. Zero skips it.
    pub grace_delay: Duration,

    /// Pipeline configuration asset used as the job template.
    pub pipeline_config_path: String,

    /// Parameters threaded into every target descriptor.
    pub target_params: TargetParams,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            grace_delay: Duration::from_secs(2),
            pipeline_config_path: default_pipeline_config_path(),
            target_params: TargetParams::default(),
        }
    }
}

impl From<&RendererDefaults> for RendererConfig {
    fn from(defaults: &RendererDefaults) -> Self {
        Self {
            grace_delay: Duration::from_millis(defaults.grace_delay_ms),
            pipeline_config_path: defaults.pipeline_config.clone(),
            target_params: TargetParams {
                depth_range_meters: defaults.depth_range_meters,
            },
        }
    }
}

/// Where the active run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Preparing(TargetKind),
    AwaitingJob(TargetKind),
    Finalizing {
        target: TargetKind,
        job_succeeded: bool,
    },
    Done {
        success: bool,
    },
}

/// Snapshot of the renderer's state.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorState {
    pub is_running: bool,
    pub current_target: Option<TargetDescriptor>,
    pub output_directory: PathBuf,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct RunState {
    snapshot: OrchestratorState,
    phase: RunPhase,
    run_id: Option<u64>,
    cancel: Option<CancellationToken>,
    last_rejection: Option<String>,
}

struct Shared {
    state: Mutex<RunState>,
    notifier: CompletionNotifier,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, phase: RunPhase) {
        tracing::debug!(?phase, "Renderer transition");
        self.lock().phase = phase;
    }
}

/// Renders the selected targets of a timeline, one at a time.
pub struct SequenceRenderer {
    host: HostServices,
    view: SharedViewState,
    config: RendererConfig,
    shared: Arc<Shared>,
}

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

impl SequenceRenderer {
    pub fn new(host: HostServices, view: SharedViewState, config: RendererConfig) -> Self {
        Self {
            host,
            view,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(RunState::default()),
                notifier: CompletionNotifier::new(),
            }),
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Listeners for finished runs.
    pub fn notifier(&self) -> &CompletionNotifier {
        &self.shared.notifier
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().snapshot.is_running
    }

    pub fn phase(&self) -> RunPhase {
        self.shared.lock().phase
    }

    pub fn state(&self) -> OrchestratorState {
        self.shared.lock().snapshot.clone()
    }

    /// Error of the last finished run, or of the last rejected start
    /// made while idle.
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().snapshot.last_error.clone()
    }

    /// Why the most recent `start_run` was rejected.
    pub fn rejection_reason(&self) -> Option<String> {
        self.shared.lock().last_rejection.clone()
    }

    /// Start rendering. Returns `false` if the run was rejected; the
    /// reason is available from [`Self::rejection_reason`].
    pub fn start_run(
        &self,
        timeline: &TimelineHandle,
        selection: &TargetSelection,
        output_dir: impl Into<PathBuf>,
    ) -> bool {
        self.try_start_run(timeline, selection, output_dir).is_ok()
    }

    /// Start rendering, returning the run id.
    ///
    /// Must be called within a tokio runtime; the run proceeds on a
    /// spawned task and this call never waits for it.
    pub fn try_start_run(
        &self,
        timeline: &TimelineHandle,
        selection: &TargetSelection,
        output_dir: impl Into<PathBuf>,
    ) -> RenderResult<u64> {
        let mut state = self.shared.lock();
        match self.prepare_run(&state, timeline, selection, output_dir.into()) {
            Ok((run, cancel)) => {
                let run_id = run.run_id;
                state.snapshot = OrchestratorState {
                    is_running: true,
                    current_target: None,
                    output_directory: run.output_dir.clone(),
                    last_error: None,
                };
                state.phase = run
                    .queue
                    .peek()
                    .map_or(RunPhase::Idle, |first| RunPhase::Preparing(first.kind()));
                state.run_id = Some(run_id);
                state.cancel = Some(cancel);
                state.last_rejection = None;
                // Armed before the lock is released so the run's task can
                // never finish ahead of it.
                self.shared.notifier.arm(run_id);
                drop(state);

                tracing::info!(
                    run_id,
                    targets = run.queue.len(),
                    output = %run.output_dir.display(),
                    "Rendering..."
                );
                tokio::spawn(run.execute());
                Ok(run_id)
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(error = %message, "Render run rejected");
                if !state.snapshot.is_running {
                    state.snapshot.last_error = Some(message.clone());
                }
                state.last_rejection = Some(message);
                Err(err)
            }
        }
    }

    /// Start a run and wait for its outcome.
    pub async fn render(
        &self,
        timeline: &TimelineHandle,
        selection: &TargetSelection,
        output_dir: impl Into<PathBuf>,
    ) -> RenderResult<RunOutcome> {
        let mut outcomes = self.shared.notifier.subscribe();
        let run_id = self.try_start_run(timeline, selection, output_dir)?;

        loop {
            match outcomes.recv().await {
                Ok(outcome) if outcome.run_id == run_id => return Ok(outcome),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(anyhow::anyhow!("completion channel closed").into())
                }
            }
        }
    }

    /// Request cancellation of the active run. Returns whether a run was
    /// active.
    ///
    /// A run waiting on its job asks the executor to abort it, still
    /// finalizes the current target, and then fails.
    pub fn cancel(&self) -> bool {
        let state = self.shared.lock();
        if !state.snapshot.is_running {
            return false;
        }
        if let Some(cancel) = &state.cancel {
            cancel.cancel();
        }
        tracing::info!(run_id = ?state.run_id, "Cancellation requested");
        true
    }

    fn prepare_run(
        &self,
        state: &RunState,
        timeline: &TimelineHandle,
        selection: &TargetSelection,
        output_dir: PathBuf,
    ) -> RenderResult<(ActiveRun, CancellationToken)> {
        if state.snapshot.is_running {
            return Err(RenderError::AlreadyRunning);
        }

        let shared_timeline = timeline
            .upgrade()
            .ok_or_else(|| RenderError::invalid_timeline("Provided timeline is null"))?;
        let job_name = lock_timeline(&shared_timeline).name.clone();
        drop(shared_timeline);

        let queue = select_targets(selection, &self.config.target_params)?;

        let job_template = self
            .host
            .configs
            .load_config(&self.config.pipeline_config_path)
            .map_err(|e| match e {
                e @ RenderError::ConfigLoadFailed { .. } => e,
                other => RenderError::config_load(other.to_string()),
            })?;

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(anyhow::anyhow!("render runs must be started inside a tokio runtime").into());
        }

        let original_style = lock_view(&self.view).selected_style();
        let cancel = CancellationToken::new();

        let run = ActiveRun {
            run_id: NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed),
            host: self.host.clone(),
            view: self.view.clone(),
            grace_delay: self.config.grace_delay,
            shared: self.shared.clone(),
            timeline: timeline.clone(),
            job_name,
            job_template,
            queue,
            output_dir,
            original_style,
            completed: vec![],
            started_at: chrono::Utc::now().to_rfc3339(),
            cancel: cancel.clone(),
        };
        Ok((run, cancel))
    }
}

impl std::fmt::Debug for SequenceRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceRenderer")
            .field("executor", &self.host.executor.name())
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

/// Everything one run owns while it executes on its task.
struct ActiveRun {
    run_id: u64,
    host: HostServices,
    view: SharedViewState,
    grace_delay: Duration,
    shared: Arc<Shared>,
    timeline: TimelineHandle,
    job_name: String,
    job_template: JobConfiguration,
    queue: RenderQueue,
    output_dir: PathBuf,
    original_style: TextureStyle,
    completed: Vec<String>,
    started_at: String,
    cancel: CancellationToken,
}

impl ActiveRun {
    async fn execute(mut self) {
        let result = self.render_all().await;
        self.finish(result);
    }

    async fn render_all(&mut self) -> RenderResult<()> {
        while let Some(target) = self.queue.pop_front() {
            self.render_target(&target).await?;
            self.completed.push(target.display_name().to_string());
        }
        Ok(())
    }

    async fn render_target(&mut self, target: &TargetDescriptor) -> RenderResult<()> {
        let name = target.display_name();
        if self.cancel.is_cancelled() {
            return Err(RenderError::cancelled(name));
        }

        {
            let mut state = self.shared.lock();
            state.snapshot.current_target = Some(target.clone());
            state.phase = RunPhase::Preparing(target.kind());
        }
        tracing::info!(run_id = self.run_id, target_name = %name, "Rendering the {name} target");

        let mutator: Box<dyn SceneMutator> = self.host.mutators.mutator_for(target);
        if let Err(err) = self.with_scene(|timeline, view| mutator.prepare(timeline, view)) {
            // Undo whatever part of the preparation went through.
            if let Err(cleanup) = self.with_scene(|timeline, view| mutator.finalize(timeline, view))
            {
                tracing::warn!(target_name = %name, error = %cleanup, "Cleanup after failed preparation failed");
            }
            return Err(prepare_failure(name, err));
        }

        let job_result = self.submit_and_wait(target).await;

        self.shared.enter(RunPhase::Finalizing {
            target: target.kind(),
            job_succeeded: job_result.is_ok(),
        });
        let finalize_result = self.with_scene(|timeline, view| mutator.finalize(timeline, view));

        match (finalize_result, job_result) {
            (Err(err), job_result) => {
                if let Err(job_err) = job_result {
                    tracing::warn!(target_name = %name, error = %job_err, "Job failure superseded by finalize failure");
                }
                Err(finalize_failure(name, err))
            }
            (Ok(()), job_result) => job_result,
        }
    }

    async fn submit_and_wait(&mut self, target: &TargetDescriptor) -> RenderResult<()> {
        let name = target.display_name();
        let executor = self.host.executor.clone();

        if !self.grace_delay.is_zero() {
            let scheduler = self.host.scheduler.clone();
            tokio::select! {
                _ = scheduler.delay(self.grace_delay) => {}
                _ = self.cancel.cancelled() => return Err(RenderError::cancelled(name)),
            }
        }

        if self.timeline.upgrade().is_none() {
            return Err(RenderError::invalid_timeline(
                "Provided timeline is null when starting the rendering",
            ));
        }
        if !executor.is_available() {
            return Err(RenderError::JobSubsystemUnavailable);
        }

        executor.clear_queue().await.map_err(|e| match e {
            e @ RenderError::QueueSetupFailed { .. } => e,
            other => RenderError::queue_setup(other.to_string()),
        })?;

        let output_directory = target.output_dir(&self.output_dir);
        let mut configuration = self.job_template.clone();
        configuration.output_directory = output_directory.clone();

        let job = RenderJob {
            job_name: self.job_name.clone(),
            timeline: self.timeline.clone(),
            target: target.clone(),
            output_directory,
            configuration,
        };
        let handle = executor.submit(job).await.map_err(|e| match e {
            e @ RenderError::JobSubmissionFailed { .. } => e,
            other => RenderError::job_submission(name, other.to_string()),
        })?;

        let job_id = handle.id;
        self.shared.enter(RunPhase::AwaitingJob(target.kind()));
        tracing::info!(
            run_id = self.run_id,
            target_name = %name,
            job = %job_id,
            executor = executor.name(),
            "Job submitted"
        );

        tokio::select! {
            outcome = handle.wait() => match outcome {
                JobOutcome::Succeeded => {
                    tracing::info!(target_name = %name, job = %job_id, "Job finished");
                    Ok(())
                }
                JobOutcome::Failed(reason) => Err(RenderError::job_failed(name, reason)),
            },
            _ = self.cancel.cancelled() => {
                executor.cancel(job_id).await;
                Err(RenderError::cancelled(name))
            }
        }
    }

    /// Run `f` against the locked timeline and view state.
    fn with_scene<F>(&self, f: F) -> RenderResult<()>
    where
        F: FnOnce(&mut Timeline, &mut TextureStyleManager) -> RenderResult<()>,
    {
        let timeline = self.timeline.upgrade().ok_or_else(|| {
            RenderError::invalid_timeline("Provided timeline was dropped while rendering")
        })?;
        let mut timeline = lock_timeline(&timeline);
        let mut view = lock_view(&self.view);
        f(&mut *timeline, &mut *view)
    }

    fn finish(mut self, result: RenderResult<()>) {
        let success = result.is_ok();
        let error = result.err().map(|e| e.to_string());
        self.shared.enter(RunPhase::Done { success });

        match &error {
            None => tracing::info!(
                run_id = self.run_id,
                targets = ?self.completed,
                "Rendering finished"
            ),
            Some(message) => tracing::warn!(run_id = self.run_id, error = %message, "Rendering failed"),
        }

        let discarded = self.queue.clear();
        if discarded > 0 {
            tracing::debug!(run_id = self.run_id, discarded, "Dropped remaining targets");
        }

        if let Err(e) = lock_view(&self.view).checkout(self.original_style) {
            tracing::warn!(error = %e, style = ?self.original_style, "Could not restore the original texture style");
        }

        {
            let mut state = self.shared.lock();
            state.snapshot.is_running = false;
            state.snapshot.current_target = None;
            state.snapshot.last_error = error.clone();
            state.phase = RunPhase::Idle;
            state.run_id = None;
            state.cancel = None;
        }

        let outcome = RunOutcome {
            run_id: self.run_id,
            success,
            error,
            completed_targets: std::mem::take(&mut self.completed),
            started_at: std::mem::take(&mut self.started_at),
            finished_at: chrono::Utc::now().to_rfc3339(),
        };
        self.shared.notifier.notify(&outcome);
    }
}

// Hook errors that already name their hook, and timeline invalidation,
// pass through unchanged; anything else is attributed to the hook.
fn prepare_failure(target: &str, err: RenderError) -> RenderError {
    match err {
        e @ (RenderError::PrepareHookFailed { .. } | RenderError::InvalidTimeline { .. }) => e,
        other => RenderError::prepare(target, other.to_string()),
    }
}

fn finalize_failure(target: &str, err: RenderError) -> RenderError {
    match err {
        e @ (RenderError::FinalizeHookFailed { .. } | RenderError::InvalidTimeline { .. }) => e,
        other => RenderError::finalize(target, other.to_string()),
    }
}

fn lock_timeline(timeline: &Arc<Mutex<Timeline>>) -> MutexGuard<'_, Timeline> {
    timeline.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_view(view: &SharedViewState) -> MutexGuard<'_, TextureStyleManager> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}
