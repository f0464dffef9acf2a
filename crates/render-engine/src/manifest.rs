//! Host-less job executor that records jobs instead of rendering them.
//!
//! Each submitted job gets its output directory created and a
//! `job.json` manifest describing exactly what the host would have been
//! asked to render: the target, the camera post-process stacks as the
//! target's mutator left them, and the job configuration.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use seqsynth_common::error::{RenderError, RenderResult};
use seqsynth_sequence_model::{Camera, Timeline};

use crate::host::{JobConfiguration, JobExecutor, JobHandle, JobId, RenderJob};
use crate::target::TargetParameters;

/// File name of the manifest written into each target directory.
pub const MANIFEST_FILE: &str = "job.json";

/// Contents of `job.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManifest {
    pub job_id: JobId,
    pub job_name: String,
    pub target: String,
    pub parameters: TargetParameters,
    pub frame_rate: u32,
    pub start_frame: u64,
    pub frame_count: u64,
    pub cameras: Vec<Camera>,
    pub configuration: JobConfiguration,
    pub submitted_at: String,
}

impl JobManifest {
    fn new(id: JobId, job: &RenderJob, timeline: &Timeline) -> Self {
        Self {
            job_id: id,
            job_name: job.job_name.clone(),
            target: job.target.display_name().to_string(),
            parameters: job.target.parameters(),
            frame_rate: timeline.frame_rate,
            start_frame: timeline
                .camera_cuts
                .iter()
                .map(|cut| cut.start_frame)
                .min()
                .unwrap_or(0),
            frame_count: timeline.frame_count(),
            cameras: timeline.cameras().cloned().collect(),
            configuration: job.configuration.clone(),
            submitted_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Load a manifest written by [`ManifestExecutor`].
    pub fn load(target_dir: impl Into<PathBuf>) -> RenderResult<Self> {
        let path = target_dir.into().join(MANIFEST_FILE);
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// [`JobExecutor`] that writes a manifest per job and reports success.
#[derive(Debug, Default)]
pub struct ManifestExecutor {
    completion_delay: Duration,
    submitted: AtomicU64,
}

impl ManifestExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report completion only after `delay`, to mimic a job that takes
    /// time.
    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = delay;
        self
    }

    /// Number of jobs submitted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl JobExecutor for ManifestExecutor {
    fn is_available(&self) -> bool {
        true
    }

    async fn clear_queue(&self) -> RenderResult<()> {
        Ok(())
    }

    async fn submit(&self, job: RenderJob) -> RenderResult<JobHandle> {
        let target = job.target.display_name().to_string();
        let timeline = job
            .timeline
            .upgrade()
            .ok_or_else(|| RenderError::job_submission(&target, "timeline is gone"))?;

        let id = JobId::next();
        let manifest = {
            let timeline = timeline.lock().unwrap_or_else(PoisonError::into_inner);
            JobManifest::new(id, &job, &timeline)
        };

        let write = || -> RenderResult<()> {
            std::fs::create_dir_all(&job.output_directory)?;
            let json = serde_json::to_string_pretty(&manifest)?;
            std::fs::write(job.output_directory.join(MANIFEST_FILE), json)?;
            Ok(())
        };
        write().map_err(|e| RenderError::job_submission(&target, e.to_string()))?;

        self.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            job = %id,
            target_name = %target,
            output = %job.output_directory.display(),
            "Manifest written"
        );

        let (handle, completer) = JobHandle::pair(id);
        let delay = self.completion_delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            completer.succeed();
        });
        Ok(handle)
    }

    fn name(&self) -> &str {
        "manifest"
    }
}
