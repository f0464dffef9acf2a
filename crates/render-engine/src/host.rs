//! Interfaces to the host that actually renders.
//!
//! The renderer never draws anything itself. It loads a job template
//! through a [`ConfigLoader`], hands one [`RenderJob`] per target to a
//! [`JobExecutor`], waits on the job's completion callback, and uses a
//! [`Scheduler`] for the pause between scene preparation and submission.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use seqsynth_common::error::{RenderError, RenderResult};
use seqsynth_common::paths::{relative_asset_path, DEFAULT_PIPELINE_CONFIG_ASSET};
use seqsynth_sequence_model::TimelineHandle;

use crate::target::TargetDescriptor;

/// Image format written by a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Exr,
    Jpg,
}

/// Job template loaded from a pipeline configuration asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfiguration {
    /// Image format of the rendered frames.
    pub output_format: ImageFormat,

    /// Output resolution `[width, height]`.
    pub resolution: [u32; 2],

    /// Frame file name pattern (`{sequence}`, `{frame}` placeholders).
    pub file_name_format: String,

    /// Spatial anti-aliasing sample count.
    pub anti_aliasing_samples: u32,

    /// Where frames are written. Overwritten for every target.
    #[serde(default)]
    pub output_directory: PathBuf,
}

impl Default for JobConfiguration {
    fn default() -> Self {
        Self {
            output_format: ImageFormat::Png,
            resolution: [1920, 1080],
            file_name_format: "{sequence}.{frame}".to_string(),
            anti_aliasing_samples: 1,
            output_directory: PathBuf::new(),
        }
    }
}

/// Resolves a named configuration asset to a job template.
pub trait ConfigLoader: Send + Sync {
    fn load_config(&self, path: &str) -> RenderResult<JobConfiguration>;
}

/// Loads `<root>/<asset>.json`.
///
/// The default pipeline configuration falls back to
/// [`JobConfiguration::default`] when no file overrides it; any other
/// missing asset is an error.
#[derive(Debug, Clone)]
pub struct JsonConfigLoader {
    root: PathBuf,
}

impl JsonConfigLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File an asset reference resolves to.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root
            .join(Path::new(relative_asset_path(path)))
            .with_extension("json")
    }
}

impl ConfigLoader for JsonConfigLoader {
    fn load_config(&self, path: &str) -> RenderResult<JobConfiguration> {
        let file = self.resolve(path);
        if !file.exists() {
            if relative_asset_path(path) == DEFAULT_PIPELINE_CONFIG_ASSET {
                tracing::debug!(path, "No override for the default pipeline config");
                return Ok(JobConfiguration::default());
            }
            return Err(RenderError::config_load(format!(
                "{path} not found at {}",
                file.display()
            )));
        }

        let content = std::fs::read_to_string(&file)
            .map_err(|e| RenderError::config_load(format!("{}: {e}", file.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| RenderError::config_load(format!("{}: {e}", file.display())))
    }
}

/// Always returns the same configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLoader(pub JobConfiguration);

impl ConfigLoader for StaticConfigLoader {
    fn load_config(&self, _path: &str) -> RenderResult<JobConfiguration> {
        Ok(self.0.clone())
    }
}

/// Identifier of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl JobId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// One unit of rendering work for the host.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Job name; the timeline's name.
    pub job_name: String,

    /// Timeline to render.
    pub timeline: TimelineHandle,

    /// Target this job renders.
    pub target: TargetDescriptor,

    /// Directory the frames go to.
    pub output_directory: PathBuf,

    /// Job template with `output_directory` filled in.
    pub configuration: JobConfiguration,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// Returned by [`JobExecutor::submit`]; resolves when the job finishes.
#[derive(Debug)]
pub struct JobHandle {
    pub id: JobId,
    completion: oneshot::Receiver<JobOutcome>,
}

/// The host's side of a [`JobHandle`]. Completing consumes it, so the
/// completion callback fires at most once. Dropping it without
/// completing reports a failed job.
#[derive(Debug)]
pub struct JobCompleter {
    id: JobId,
    sender: oneshot::Sender<JobOutcome>,
}

impl JobHandle {
    /// Create a handle and the completer the host keeps.
    pub fn pair(id: JobId) -> (JobHandle, JobCompleter) {
        let (sender, completion) = oneshot::channel();
        (JobHandle { id, completion }, JobCompleter { id, sender })
    }

    /// Wait for the job's completion callback.
    pub async fn wait(self) -> JobOutcome {
        self.completion.await.unwrap_or_else(|_| {
            JobOutcome::Failed("executor dropped the job without reporting completion".to_string())
        })
    }
}

impl JobCompleter {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn complete(self, outcome: JobOutcome) {
        if self.sender.send(outcome).is_err() {
            tracing::debug!(job = %self.id, "Job completion ignored; nobody is waiting");
        }
    }

    pub fn succeed(self) {
        self.complete(JobOutcome::Succeeded);
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.complete(JobOutcome::Failed(reason.into()));
    }
}

/// The host's render-job subsystem.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Whether the subsystem can take jobs right now.
    fn is_available(&self) -> bool;

    /// Remove any jobs left in the host's queue before a new submission.
    async fn clear_queue(&self) -> RenderResult<()>;

    /// Start rendering `job`. Completion is reported through the handle.
    async fn submit(&self, job: RenderJob) -> RenderResult<JobHandle>;

    /// Ask the host to abort a running job.
    async fn cancel(&self, _job: JobId) {}

    /// Executor name for logging.
    fn name(&self) -> &str;
}

/// Delays used between scene preparation and job submission.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn delay(&self, duration: Duration);
}

/// [`Scheduler`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn delay(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::time::sleep(duration).await;
    }
}
