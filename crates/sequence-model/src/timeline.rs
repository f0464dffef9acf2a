//! Timeline (recorded camera sequence) types.
//!
//! A timeline is the shared asset every render target is produced from.
//! It is split into camera cut sections; each section is bound to one
//! camera whose post-process stack is what per-target scene mutators
//! swap out before a render and clear afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};

/// Timeline owned by the caller and shared with the renderer.
pub type SharedTimeline = Arc<Mutex<Timeline>>;

/// Non-owning reference to a shared timeline.
///
/// A handle whose owner has been dropped no longer upgrades and is
/// treated as an invalid timeline.
pub type TimelineHandle = Weak<Mutex<Timeline>>;

/// Top-level timeline file (`*.timeline.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    /// Schema version.
    pub version: String,

    /// Human-readable sequence name. Used as the render job name.
    pub name: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Playback frame rate.
    pub frame_rate: u32,

    /// Camera cut sections, in playback order.
    pub camera_cuts: Vec<CameraCut>,

    /// Semantic classes available for the semantic texture style.
    #[serde(default)]
    pub semantic_classes: Vec<SemanticClass>,
}

/// One camera cut section of the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraCut {
    /// First frame of the section (inclusive).
    pub start_frame: u64,

    /// Last frame of the section (exclusive).
    pub end_frame: u64,

    /// Camera bound to this section.
    pub camera: Camera,
}

/// A camera bound to a cut section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,

    /// Weighted post-process blendables applied to this camera, in order.
    #[serde(default)]
    pub post_process: Vec<PostProcessMaterial>,
}

/// A post-process material placed on a camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProcessMaterial {
    /// Asset reference of the material.
    pub name: String,

    /// Scalar parameter overrides.
    #[serde(default)]
    pub scalar_params: BTreeMap<String, f64>,
}

/// A semantic class and the flat color it renders with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticClass {
    pub name: String,
    pub color: [u8; 3],
}

impl Timeline {
    /// Create an empty timeline.
    pub fn new(name: impl Into<String>, frame_rate: u32) -> Self {
        Self {
            version: "1.0".to_string(),
            name: name.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            frame_rate,
            camera_cuts: vec![],
            semantic_classes: vec![],
        }
    }

    /// Create a timeline with `cameras` back-to-back cut sections of
    /// `frames_per_cut` frames each and a default set of semantic classes.
    pub fn sample(
        name: impl Into<String>,
        frame_rate: u32,
        cameras: usize,
        frames_per_cut: u64,
    ) -> Self {
        let mut timeline = Self::new(name, frame_rate);
        for index in 0..cameras {
            let start = index as u64 * frames_per_cut;
            timeline.camera_cuts.push(CameraCut {
                start_frame: start,
                end_frame: start + frames_per_cut,
                camera: Camera::new(format!("CineCamera{}", index + 1)),
            });
        }
        timeline.semantic_classes = vec![
            SemanticClass {
                name: "Undefined".to_string(),
                color: [0, 0, 0],
            },
            SemanticClass {
                name: "Road".to_string(),
                color: [128, 64, 128],
            },
            SemanticClass {
                name: "Vehicle".to_string(),
                color: [0, 0, 142],
            },
        ];
        timeline
    }

    /// Wrap the timeline for sharing with a renderer.
    pub fn into_shared(self) -> SharedTimeline {
        Arc::new(Mutex::new(self))
    }

    /// Cameras bound to the cut sections, in cut order.
    pub fn cameras(&self) -> impl Iterator<Item = &Camera> {
        self.camera_cuts.iter().map(|cut| &cut.camera)
    }

    /// Mutable access to the cameras bound to the cut sections.
    pub fn cameras_mut(&mut self) -> impl Iterator<Item = &mut Camera> {
        self.camera_cuts.iter_mut().map(|cut| &mut cut.camera)
    }

    /// Whether any cut section has a camera bound.
    pub fn has_cameras(&self) -> bool {
        !self.camera_cuts.is_empty()
    }

    /// Number of frames spanned by the cut sections.
    pub fn frame_count(&self) -> u64 {
        let start = self.camera_cuts.iter().map(|c| c.start_frame).min();
        let end = self.camera_cuts.iter().map(|c| c.end_frame).max();
        match (start, end) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        }
    }

    /// Duration in seconds at the timeline's frame rate.
    pub fn duration_secs(&self) -> f64 {
        if self.frame_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.frame_rate as f64
    }

    /// Remove every post-process material from every camera.
    pub fn clear_post_process(&mut self) {
        for camera in self.cameras_mut() {
            camera.post_process.clear();
        }
    }

    /// Report structural problems. An empty list means the timeline
    /// can be rendered.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = vec![];

        if self.frame_rate == 0 {
            issues.push("Frame rate must be greater than zero".to_string());
        }
        if self.camera_cuts.is_empty() {
            issues.push("No camera cut sections".to_string());
        }

        for (index, cut) in self.camera_cuts.iter().enumerate() {
            if cut.end_frame <= cut.start_frame {
                issues.push(format!(
                    "Cut {index} ({}) is empty: frames {}..{}",
                    cut.camera.name, cut.start_frame, cut.end_frame
                ));
            }
            if cut.camera.name.trim().is_empty() {
                issues.push(format!("Cut {index} has an unnamed camera"));
            }
        }

        let mut ordered: Vec<&CameraCut> = self.camera_cuts.iter().collect();
        ordered.sort_by_key(|cut| cut.start_frame);
        for pair in ordered.windows(2) {
            if pair[1].start_frame < pair[0].end_frame {
                issues.push(format!(
                    "Cuts overlap at frame {} ({} / {})",
                    pair[1].start_frame, pair[0].camera.name, pair[1].camera.name
                ));
            }
        }

        issues
    }
}

impl Camera {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            post_process: vec![],
        }
    }
}

impl PostProcessMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scalar_params: BTreeMap::new(),
        }
    }

    /// Builder-style scalar parameter override.
    pub fn with_scalar(mut self, key: impl Into<String>, value: f64) -> Self {
        self.scalar_params.insert(key.into(), value);
        self
    }

    pub fn scalar(&self, key: &str) -> Option<f64> {
        self.scalar_params.get(key).copied()
    }
}

/// A timeline loaded from (or bound to) a file on disk.
#[derive(Debug, Clone)]
pub struct LoadedTimeline {
    /// File the timeline is stored in.
    pub path: PathBuf,

    pub timeline: Timeline,
}

impl LoadedTimeline {
    /// Load a timeline from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TimelineError> {
        let path = path.as_ref().to_path_buf();

        let json = std::fs::read_to_string(&path).map_err(|e| TimelineError::IoError {
            path: path.clone(),
            source: e,
        })?;

        let timeline: Timeline =
            serde_json::from_str(&json).map_err(|e| TimelineError::ParseError {
                path: path.clone(),
                source: e,
            })?;

        Ok(Self { path, timeline })
    }

    /// Save the timeline to its file, creating parent directories.
    pub fn save(&self) -> Result<(), TimelineError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TimelineError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json =
            serde_json::to_string_pretty(&self.timeline).map_err(|e| TimelineError::ParseError {
                path: self.path.clone(),
                source: e,
            })?;
        std::fs::write(&self.path, json).map_err(|e| TimelineError::IoError {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Write a new timeline to disk and return it.
    pub fn create(path: impl AsRef<Path>, timeline: Timeline) -> Result<Self, TimelineError> {
        let loaded = Self {
            path: path.as_ref().to_path_buf(),
            timeline,
        };
        loaded.save()?;
        Ok(loaded)
    }

    /// Load and reject timelines with structural problems.
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self, TimelineError> {
        let loaded = Self::load(path)?;
        let issues = loaded.timeline.validate();
        if !issues.is_empty() {
            return Err(TimelineError::ValidationError {
                message: issues.join("; "),
            });
        }
        Ok(loaded)
    }
}

/// Errors that can occur when working with timeline files.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid timeline: {message}")]
    ValidationError { message: String },
}
