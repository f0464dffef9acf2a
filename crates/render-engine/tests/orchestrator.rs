use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use seqsynth_common::error::{RenderError, RenderResult};
use seqsynth_render_engine::manifest::{JobManifest, ManifestExecutor};
use seqsynth_render_engine::{
    ConfigLoader, HostServices, JobCompleter, JobConfiguration, JobExecutor, JobHandle, JobId,
    JobOutcome, MutatorProvider, RenderJob, RendererConfig, RunPhase, SceneMutator, Scheduler,
    SequenceRenderer, StandardMutators, StaticConfigLoader, TargetDescriptor, TargetKind,
    TargetParams, TargetSelection, DEPTH_RANGE_PARAM,
};
use seqsynth_sequence_model::{
    SharedTimeline, SharedViewState, TextureStyle, TextureStyleManager, Timeline,
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Prepare(TargetKind, Option<f64>),
    Job(TargetKind),
    Finalize(TargetKind),
    CancelJob,
}

type Trace = Arc<Mutex<Vec<Event>>>;

fn events(trace: &Trace) -> Vec<Event> {
    trace.lock().unwrap().clone()
}

struct ScriptedExecutor {
    trace: Trace,
    available: bool,
    fail_queue: bool,
    outcomes: Mutex<HashMap<TargetKind, JobOutcome>>,
    held_kinds: Mutex<HashSet<TargetKind>>,
    held: Mutex<Vec<(TargetKind, JobCompleter)>>,
    output_dirs: Mutex<Vec<PathBuf>>,
}

impl ScriptedExecutor {
    fn new(trace: Trace) -> Self {
        Self {
            trace,
            available: true,
            fail_queue: false,
            outcomes: Mutex::new(HashMap::new()),
            held_kinds: Mutex::new(HashSet::new()),
            held: Mutex::new(vec![]),
            output_dirs: Mutex::new(vec![]),
        }
    }

    fn fail_job(self, kind: TargetKind) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .insert(kind, JobOutcome::Failed("GPU crashed".to_string()));
        self
    }

    fn hold_job(self, kind: TargetKind) -> Self {
        self.held_kinds.lock().unwrap().insert(kind);
        self
    }

    fn release(&self, outcome: JobOutcome) {
        let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();
        for (_, completer) in held {
            completer.complete(outcome.clone());
        }
    }
}

#[async_trait]
impl JobExecutor for ScriptedExecutor {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn clear_queue(&self) -> RenderResult<()> {
        if self.fail_queue {
            return Err(RenderError::queue_setup("Job queue not properly cleared"));
        }
        Ok(())
    }

    async fn submit(&self, job: RenderJob) -> RenderResult<JobHandle> {
        let kind = job.target.kind();
        self.trace.lock().unwrap().push(Event::Job(kind));
        self.output_dirs
            .lock()
            .unwrap()
            .push(job.configuration.output_directory.clone());

        let (handle, completer) = JobHandle::pair(JobId::next());
        if self.held_kinds.lock().unwrap().contains(&kind) {
            self.held.lock().unwrap().push((kind, completer));
        } else {
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .get(&kind)
                .cloned()
                .unwrap_or(JobOutcome::Succeeded);
            completer.complete(outcome);
        }
        Ok(handle)
    }

    async fn cancel(&self, _job: JobId) {
        self.trace.lock().unwrap().push(Event::CancelJob);
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct RecordingMutators {
    trace: Trace,
    fail_prepare: Option<TargetKind>,
    fail_finalize: Option<TargetKind>,
}

struct RecordingMutator {
    target: TargetDescriptor,
    trace: Trace,
    fail_prepare: bool,
    fail_finalize: bool,
    inner: Box<dyn SceneMutator>,
}

impl MutatorProvider for RecordingMutators {
    fn mutator_for(&self, target: &TargetDescriptor) -> Box<dyn SceneMutator> {
        Box::new(RecordingMutator {
            target: target.clone(),
            trace: self.trace.clone(),
            fail_prepare: self.fail_prepare == Some(target.kind()),
            fail_finalize: self.fail_finalize == Some(target.kind()),
            inner: StandardMutators.mutator_for(target),
        })
    }
}

impl SceneMutator for RecordingMutator {
    fn prepare(&self, timeline: &mut Timeline, view: &mut TextureStyleManager) -> RenderResult<()> {
        self.trace.lock().unwrap().push(Event::Prepare(
            self.target.kind(),
            self.target.depth_range_meters(),
        ));
        if self.fail_prepare {
            return Err(RenderError::prepare(
                self.target.display_name(),
                "material override missing",
            ));
        }
        self.inner.prepare(timeline, view)
    }

    fn finalize(&self, timeline: &mut Timeline, view: &mut TextureStyleManager) -> RenderResult<()> {
        self.trace
            .lock()
            .unwrap()
            .push(Event::Finalize(self.target.kind()));
        self.inner.finalize(timeline, view)?;
        if self.fail_finalize {
            return Err(RenderError::finalize(
                self.target.display_name(),
                "could not restore camera",
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingScheduler {
    delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn delay(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Never finishes a delay; counts how many were started.
#[derive(Default)]
struct StalledScheduler {
    started: AtomicUsize,
}

#[async_trait]
impl Scheduler for StalledScheduler {
    async fn delay(&self, _duration: Duration) {
        self.started.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
    }
}

struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load_config(&self, path: &str) -> RenderResult<JobConfiguration> {
        Err(RenderError::config_load(format!("{path} is missing")))
    }
}

struct Harness {
    trace: Trace,
    executor: Arc<ScriptedExecutor>,
    view: SharedViewState,
    timeline: SharedTimeline,
    renderer: SequenceRenderer,
    finished: Arc<AtomicUsize>,
}

struct HarnessOptions {
    executor: fn(Trace) -> ScriptedExecutor,
    fail_prepare: Option<TargetKind>,
    fail_finalize: Option<TargetKind>,
    configs: Arc<dyn ConfigLoader>,
    scheduler: Option<Arc<dyn Scheduler>>,
    grace_delay: Duration,
    depth_range_meters: f64,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            executor: ScriptedExecutor::new,
            fail_prepare: None,
            fail_finalize: None,
            configs: Arc::new(StaticConfigLoader::default()),
            scheduler: None,
            grace_delay: Duration::ZERO,
            depth_range_meters: 100.0,
        }
    }
}

fn harness(options: HarnessOptions) -> Harness {
    let trace: Trace = Arc::new(Mutex::new(vec![]));
    let executor = Arc::new((options.executor)(trace.clone()));
    let timeline = Timeline::sample("Drive", 30, 2, 60);
    let view = TextureStyleManager::for_timeline(&timeline).into_shared();

    let mut host = HostServices::new(executor.clone(), options.configs).with_mutators(Arc::new(
        RecordingMutators {
            trace: trace.clone(),
            fail_prepare: options.fail_prepare,
            fail_finalize: options.fail_finalize,
        },
    ));
    if let Some(scheduler) = options.scheduler {
        host = host.with_scheduler(scheduler);
    }

    let config = RendererConfig {
        grace_delay: options.grace_delay,
        target_params: TargetParams {
            depth_range_meters: options.depth_range_meters,
        },
        ..RendererConfig::default()
    };
    let renderer = SequenceRenderer::new(host, view.clone(), config);

    let finished = Arc::new(AtomicUsize::new(0));
    let counter = finished.clone();
    renderer.notifier().on_finished(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    Harness {
        trace,
        executor,
        view,
        timeline: timeline.into_shared(),
        renderer,
        finished,
    }
}

fn selection(kinds: &[TargetKind]) -> TargetSelection {
    kinds.iter().copied().collect()
}

fn output_root(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("seqsynth_test_{name}"))
}

async fn wait_for_phase(renderer: &SequenceRenderer, phase: RunPhase) {
    for _ in 0..500 {
        if renderer.phase() == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("renderer never reached {phase:?}, stuck in {:?}", renderer.phase());
}

#[tokio::test]
async fn color_and_depth_run_in_order_with_depth_range() {
    let h = harness(HarnessOptions {
        depth_range_meters: 50.0,
        ..HarnessOptions::default()
    });
    let selection = TargetSelection::new()
        .with(TargetKind::Color, true)
        .with(TargetKind::Depth, true)
        .with(TargetKind::Normal, false)
        .with(TargetKind::Semantic, false);
    let root = output_root("color_depth");

    let outcome = h
        .renderer
        .render(&Arc::downgrade(&h.timeline), &selection, &root)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.completed_targets, vec!["ColorImage", "DepthImage"]);
    assert_eq!(
        events(&h.trace),
        vec![
            Event::Prepare(TargetKind::Color, None),
            Event::Job(TargetKind::Color),
            Event::Finalize(TargetKind::Color),
            Event::Prepare(TargetKind::Depth, Some(50.0)),
            Event::Job(TargetKind::Depth),
            Event::Finalize(TargetKind::Depth),
        ]
    );
    assert_eq!(
        *h.executor.output_dirs.lock().unwrap(),
        vec![root.join("ColorImage"), root.join("DepthImage")]
    );
    assert_eq!(h.finished.load(Ordering::SeqCst), 1);
    assert!(!h.renderer.is_running());
    assert_eq!(h.renderer.phase(), RunPhase::Idle);
}

#[tokio::test]
async fn every_target_alternates_prepare_job_finalize() {
    let h = harness(HarnessOptions::default());
    let outcome = h
        .renderer
        .render(
            &Arc::downgrade(&h.timeline),
            &TargetSelection::all(),
            output_root("all"),
        )
        .await
        .unwrap();

    assert!(outcome.success);
    let trace = events(&h.trace);
    assert_eq!(trace.len(), 12);
    for (chunk, kind) in trace.chunks(3).zip(TargetKind::ALL) {
        assert!(matches!(chunk[0], Event::Prepare(k, _) if k == kind));
        assert_eq!(chunk[1], Event::Job(kind));
        assert_eq!(chunk[2], Event::Finalize(kind));
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.finished.load(Ordering::SeqCst), 1);

    let timeline = h.timeline.lock().unwrap();
    assert!(timeline.cameras().all(|c| c.post_process.is_empty()));
}

#[tokio::test]
async fn job_failure_still_finalizes_and_stops_the_queue() {
    let h = harness(HarnessOptions {
        executor: |trace| ScriptedExecutor::new(trace).fail_job(TargetKind::Depth),
        ..HarnessOptions::default()
    });

    let outcome = h
        .renderer
        .render(
            &Arc::downgrade(&h.timeline),
            &selection(&[TargetKind::Color, TargetKind::Depth, TargetKind::Normal]),
            output_root("job_failure"),
        )
        .await
        .unwrap();

    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(error.contains("rendering the DepthImage target"), "{error}");
    assert!(error.contains("GPU crashed"));
    assert_eq!(outcome.completed_targets, vec!["ColorImage"]);

    let trace = events(&h.trace);
    assert_eq!(trace.last(), Some(&Event::Finalize(TargetKind::Depth)));
    assert!(!trace
        .iter()
        .any(|e| matches!(e, Event::Prepare(TargetKind::Normal, _))));
    assert_eq!(h.renderer.last_error(), Some(error));
}

#[tokio::test]
async fn prepare_failure_submits_no_job() {
    let h = harness(HarnessOptions {
        fail_prepare: Some(TargetKind::Depth),
        ..HarnessOptions::default()
    });

    let outcome = h
        .renderer
        .render(
            &Arc::downgrade(&h.timeline),
            &selection(&[TargetKind::Color, TargetKind::Depth]),
            output_root("prepare_failure"),
        )
        .await
        .unwrap();

    assert!(!outcome.success);
    assert!(outcome
        .error
        .as_deref()
        .unwrap()
        .contains("preparing the rendering of the DepthImage target"));

    let trace = events(&h.trace);
    assert!(!trace.contains(&Event::Job(TargetKind::Depth)));
    // Cleanup runs the idempotent finalize for the failed target.
    assert_eq!(
        &trace[3..],
        &[
            Event::Prepare(TargetKind::Depth, Some(100.0)),
            Event::Finalize(TargetKind::Depth),
        ]
    );
    assert_eq!(h.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn finalize_failure_takes_precedence_over_job_failure() {
    let h = harness(HarnessOptions {
        executor: |trace| ScriptedExecutor::new(trace).fail_job(TargetKind::Normal),
        fail_finalize: Some(TargetKind::Normal),
        ..HarnessOptions::default()
    });

    let outcome = h
        .renderer
        .render(
            &Arc::downgrade(&h.timeline),
            &selection(&[TargetKind::Normal]),
            output_root("finalize_failure"),
        )
        .await
        .unwrap();

    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(error.contains("finalizing the rendering of the NormalImage target"), "{error}");
    assert!(!error.contains("GPU crashed"));
}

#[tokio::test]
async fn second_start_is_rejected_while_running() {
    let h = harness(HarnessOptions {
        executor: |trace| ScriptedExecutor::new(trace).hold_job(TargetKind::Color),
        ..HarnessOptions::default()
    });
    let handle = Arc::downgrade(&h.timeline);
    let root = output_root("already_running");

    assert!(h
        .renderer
        .start_run(&handle, &selection(&[TargetKind::Color]), &root));
    wait_for_phase(&h.renderer, RunPhase::AwaitingJob(TargetKind::Color)).await;

    assert!(!h
        .renderer
        .start_run(&handle, &selection(&[TargetKind::Depth]), output_root("other")));
    assert_eq!(
        h.renderer.rejection_reason().as_deref(),
        Some("Rendering already in progress")
    );

    let state = h.renderer.state();
    assert!(state.is_running);
    assert_eq!(state.output_directory, root);
    assert_eq!(
        state.current_target.map(|t| t.kind()),
        Some(TargetKind::Color)
    );
    assert_eq!(state.last_error, None);

    h.executor.release(JobOutcome::Succeeded);
    wait_for_phase(&h.renderer, RunPhase::Idle).await;
    assert_eq!(h.finished.load(Ordering::SeqCst), 1);
    assert!(!events(&h.trace).contains(&Event::Job(TargetKind::Depth)));
}

#[tokio::test]
async fn cancel_while_awaiting_job_finalizes_then_fails() {
    let h = harness(HarnessOptions {
        executor: |trace| ScriptedExecutor::new(trace).hold_job(TargetKind::Depth),
        ..HarnessOptions::default()
    });
    let mut outcomes = h.renderer.notifier().subscribe();

    assert!(h.renderer.start_run(
        &Arc::downgrade(&h.timeline),
        &selection(&[TargetKind::Color, TargetKind::Depth, TargetKind::Semantic]),
        output_root("cancel"),
    ));
    wait_for_phase(&h.renderer, RunPhase::AwaitingJob(TargetKind::Depth)).await;

    assert!(h.renderer.cancel());
    let outcome = outcomes.recv().await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("DepthImage target was cancelled"));
    let trace = events(&h.trace);
    assert_eq!(
        &trace[5..],
        &[Event::CancelJob, Event::Finalize(TargetKind::Depth)]
    );
    assert!(!trace
        .iter()
        .any(|e| matches!(e, Event::Prepare(TargetKind::Semantic, _))));
    assert!(!h.renderer.cancel());
}

#[tokio::test]
async fn cancel_during_grace_delay_skips_the_job() {
    let scheduler = Arc::new(StalledScheduler::default());
    let h = harness(HarnessOptions {
        scheduler: Some(scheduler.clone()),
        grace_delay: Duration::from_secs(2),
        ..HarnessOptions::default()
    });
    let mut outcomes = h.renderer.notifier().subscribe();

    assert!(h.renderer.start_run(
        &Arc::downgrade(&h.timeline),
        &selection(&[TargetKind::Color, TargetKind::Depth]),
        output_root("cancel_delay"),
    ));
    for _ in 0..500 {
        if scheduler.started.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(scheduler.started.load(Ordering::SeqCst), 1);

    assert!(h.renderer.cancel());
    let outcome = outcomes.recv().await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.completed_targets.is_empty());
    assert!(outcome
        .error
        .unwrap()
        .contains("ColorImage target was cancelled"));
    assert_eq!(
        events(&h.trace),
        vec![
            Event::Prepare(TargetKind::Color, None),
            Event::Finalize(TargetKind::Color),
        ]
    );
    assert!(h.executor.output_dirs.lock().unwrap().is_empty());
    assert!(!h.renderer.is_running());
}

#[tokio::test]
async fn phase_is_never_idle_while_running() {
    let h = harness(HarnessOptions {
        executor: |trace| ScriptedExecutor::new(trace).hold_job(TargetKind::Depth),
        ..HarnessOptions::default()
    });
    let handle = Arc::downgrade(&h.timeline);

    let run_id = h
        .renderer
        .try_start_run(
            &handle,
            &selection(&[TargetKind::Depth, TargetKind::Normal]),
            output_root("phase_at_start"),
        )
        .unwrap();

    // The run task has not been polled yet on this single-threaded runtime.
    assert!(h.renderer.is_running());
    assert_eq!(h.renderer.phase(), RunPhase::Preparing(TargetKind::Depth));
    assert!(h.renderer.notifier().is_armed(run_id));

    for _ in 0..50 {
        let state_running = h.renderer.is_running();
        let phase = h.renderer.phase();
        assert!(!(state_running && phase == RunPhase::Idle), "idle phase while running");
        if phase == RunPhase::AwaitingJob(TargetKind::Depth) {
            break;
        }
        tokio::task::yield_now().await;
    }
    wait_for_phase(&h.renderer, RunPhase::AwaitingJob(TargetKind::Depth)).await;

    h.executor.release(JobOutcome::Succeeded);
    wait_for_phase(&h.renderer, RunPhase::Idle).await;
    assert!(!h.renderer.is_running());
    assert!(!h.renderer.notifier().is_armed(run_id));
    assert_eq!(h.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropped_timeline_is_rejected() {
    let h = harness(HarnessOptions::default());
    let handle = Arc::downgrade(&h.timeline);
    let Harness {
        timeline, renderer, trace, finished, ..
    } = h;
    drop(timeline);

    assert!(!renderer.start_run(&handle, &TargetSelection::all(), output_root("dropped")));
    assert!(renderer
        .rejection_reason()
        .unwrap()
        .contains("Provided timeline is null"));
    assert_eq!(renderer.last_error(), renderer.rejection_reason());
    assert!(!renderer.is_running());
    assert!(events(&trace).is_empty());
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_selection_is_rejected() {
    let h = harness(HarnessOptions::default());
    let err = h
        .renderer
        .try_start_run(
            &Arc::downgrade(&h.timeline),
            &TargetSelection::new().with(TargetKind::Color, false),
            output_root("empty"),
        )
        .unwrap_err();

    assert!(matches!(err, RenderError::NoTargetsSelected));
    assert_eq!(
        h.renderer.rejection_reason().as_deref(),
        Some("No rendering targets selected")
    );
    assert!(events(&h.trace).is_empty());
}

#[tokio::test]
async fn config_load_failure_is_rejected() {
    let h = harness(HarnessOptions {
        configs: Arc::new(FailingConfigLoader),
        ..HarnessOptions::default()
    });
    let err = h
        .renderer
        .try_start_run(
            &Arc::downgrade(&h.timeline),
            &TargetSelection::all(),
            output_root("config"),
        )
        .unwrap_err();

    assert!(matches!(err, RenderError::ConfigLoadFailed { .. }));
    assert!(!h.renderer.is_running());
}

#[tokio::test]
async fn unavailable_executor_fails_after_cleanup() {
    let h = harness(HarnessOptions {
        executor: |trace| ScriptedExecutor {
            available: false,
            ..ScriptedExecutor::new(trace)
        },
        ..HarnessOptions::default()
    });

    let outcome = h
        .renderer
        .render(
            &Arc::downgrade(&h.timeline),
            &selection(&[TargetKind::Color]),
            output_root("unavailable"),
        )
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("Render job subsystem is not available")
    );
    assert_eq!(
        events(&h.trace),
        vec![
            Event::Prepare(TargetKind::Color, None),
            Event::Finalize(TargetKind::Color),
        ]
    );
}

#[tokio::test]
async fn queue_setup_failure_is_reported() {
    let h = harness(HarnessOptions {
        executor: |trace| ScriptedExecutor {
            fail_queue: true,
            ..ScriptedExecutor::new(trace)
        },
        ..HarnessOptions::default()
    });

    let outcome = h
        .renderer
        .render(
            &Arc::downgrade(&h.timeline),
            &selection(&[TargetKind::Normal]),
            output_root("queue"),
        )
        .await
        .unwrap();

    assert!(outcome
        .error
        .unwrap()
        .contains("Job queue not properly cleared"));
}

#[tokio::test]
async fn original_texture_style_is_restored() {
    let h = harness(HarnessOptions {
        executor: |trace| ScriptedExecutor::new(trace).hold_job(TargetKind::Color),
        ..HarnessOptions::default()
    });
    h.view
        .lock()
        .unwrap()
        .checkout(TextureStyle::Semantic)
        .unwrap();

    assert!(h.renderer.start_run(
        &Arc::downgrade(&h.timeline),
        &selection(&[TargetKind::Color, TargetKind::Semantic]),
        output_root("style"),
    ));
    wait_for_phase(&h.renderer, RunPhase::AwaitingJob(TargetKind::Color)).await;
    assert_eq!(h.view.lock().unwrap().selected_style(), TextureStyle::Color);

    h.executor.release(JobOutcome::Succeeded);
    wait_for_phase(&h.renderer, RunPhase::Idle).await;

    assert!(h.renderer.last_error().is_none());
    assert_eq!(
        h.view.lock().unwrap().selected_style(),
        TextureStyle::Semantic
    );
}

#[tokio::test]
async fn grace_delay_goes_through_the_scheduler() {
    let scheduler = Arc::new(RecordingScheduler::default());
    let h = harness(HarnessOptions {
        scheduler: Some(scheduler.clone()),
        grace_delay: Duration::from_secs(2),
        ..HarnessOptions::default()
    });

    let outcome = h
        .renderer
        .render(
            &Arc::downgrade(&h.timeline),
            &selection(&[TargetKind::Color, TargetKind::Normal]),
            output_root("delay"),
        )
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(
        *scheduler.delays.lock().unwrap(),
        vec![Duration::from_secs(2), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn timeline_dropped_mid_run_fails_the_run() {
    let h = harness(HarnessOptions {
        executor: |trace| ScriptedExecutor::new(trace).hold_job(TargetKind::Color),
        ..HarnessOptions::default()
    });
    let Harness {
        timeline,
        renderer,
        executor,
        ..
    } = h;

    assert!(renderer.start_run(
        &Arc::downgrade(&timeline),
        &selection(&[TargetKind::Color, TargetKind::Depth]),
        output_root("dropped_mid_run"),
    ));
    wait_for_phase(&renderer, RunPhase::AwaitingJob(TargetKind::Color)).await;

    drop(timeline);
    executor.release(JobOutcome::Succeeded);
    wait_for_phase(&renderer, RunPhase::Idle).await;

    assert!(renderer
        .last_error()
        .unwrap()
        .contains("dropped while rendering"));
}

#[tokio::test]
async fn renderer_accepts_a_new_run_after_finishing() {
    let h = harness(HarnessOptions::default());
    let handle = Arc::downgrade(&h.timeline);

    let first = h
        .renderer
        .render(&handle, &selection(&[TargetKind::Color]), output_root("rerun"))
        .await
        .unwrap();
    let second = h
        .renderer
        .render(&handle, &selection(&[TargetKind::Depth]), output_root("rerun"))
        .await
        .unwrap();

    assert!(first.success && second.success);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(h.finished.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn manifest_executor_writes_one_directory_per_target() {
    let root = output_root("manifest_run");
    let _ = std::fs::remove_dir_all(&root);

    let timeline = Timeline::sample("Drive", 30, 3, 40);
    let view = TextureStyleManager::for_timeline(&timeline).into_shared();
    let timeline = timeline.into_shared();
    let renderer = SequenceRenderer::new(
        HostServices::new(
            Arc::new(ManifestExecutor::new()),
            Arc::new(StaticConfigLoader::default()),
        ),
        view,
        RendererConfig {
            grace_delay: Duration::ZERO,
            target_params: TargetParams {
                depth_range_meters: 50.0,
            },
            ..RendererConfig::default()
        },
    );

    let outcome = renderer
        .render(&Arc::downgrade(&timeline), &TargetSelection::all(), &root)
        .await
        .unwrap();
    assert!(outcome.success, "{:?}", outcome.error);

    for kind in TargetKind::ALL {
        let manifest = JobManifest::load(root.join(kind.display_name())).unwrap();
        assert_eq!(manifest.target, kind.display_name());
        assert_eq!(manifest.cameras.len(), 3);
        assert_eq!(manifest.configuration.output_directory, root.join(kind.display_name()));
    }

    let depth = JobManifest::load(root.join("DepthImage")).unwrap();
    let material = &depth.cameras[0].post_process[0];
    assert!(material.name.ends_with("M_PPDepthImage"));
    assert_eq!(material.scalar(DEPTH_RANGE_PARAM), Some(50.0));

    let color = JobManifest::load(root.join("ColorImage")).unwrap();
    assert!(color.cameras.iter().all(|c| c.post_process.is_empty()));

    assert!(timeline
        .lock()
        .unwrap()
        .cameras()
        .all(|c| c.post_process.is_empty()));

    std::fs::remove_dir_all(&root).ok();
}
