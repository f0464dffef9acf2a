//! Per-target scene mutation.
//!
//! Before a target is rendered its mutator adjusts the shared timeline
//! and view state (post-process stacks, texture style); afterwards the
//! same mutator reverts those changes. `finalize` must be safe to call
//! without a matching `prepare` and calling it twice must leave the
//! scene exactly as calling it once does.

use seqsynth_common::error::{RenderError, RenderResult};
use seqsynth_common::paths::post_process_material_path;
use seqsynth_sequence_model::{PostProcessMaterial, TextureStyle, TextureStyleManager, Timeline};

use crate::target::{TargetDescriptor, TargetKind};

/// Scalar parameter of the depth material holding the depth range.
pub const DEPTH_RANGE_PARAM: &str = "DepthRangeMeters";

/// Prepare/finalize hooks around one target's render pass.
pub trait SceneMutator: Send + Sync {
    /// Mutate the scene for this target's pass.
    fn prepare(&self, timeline: &mut Timeline, view: &mut TextureStyleManager)
        -> RenderResult<()>;

    /// Revert what `prepare` changed.
    fn finalize(
        &self,
        timeline: &mut Timeline,
        view: &mut TextureStyleManager,
    ) -> RenderResult<()>;
}

/// Resolves the mutator for a target.
pub trait MutatorProvider: Send + Sync {
    fn mutator_for(&self, target: &TargetDescriptor) -> Box<dyn SceneMutator>;
}

/// The built-in mutators for every [`TargetKind`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardMutators;

impl MutatorProvider for StandardMutators {
    fn mutator_for(&self, target: &TargetDescriptor) -> Box<dyn SceneMutator> {
        Box::new(PostProcessMutator::for_target(target))
    }
}

/// Swaps each camera's post-process stack and the texture style for the
/// duration of a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessMutator {
    target_name: String,
    style: TextureStyle,
    material: Option<PostProcessMaterial>,
}

impl PostProcessMutator {
    pub fn for_target(target: &TargetDescriptor) -> Self {
        let material_for = |target: &TargetDescriptor| {
            PostProcessMaterial::new(post_process_material_path(target.display_name()))
        };

        let (style, material) = match target.kind() {
            TargetKind::Color => (TextureStyle::Color, None),
            TargetKind::Depth => {
                let range = target
                    .depth_range_meters()
                    .unwrap_or(crate::target::DEFAULT_DEPTH_RANGE_METERS);
                (
                    TextureStyle::Color,
                    Some(material_for(target).with_scalar(DEPTH_RANGE_PARAM, range)),
                )
            }
            TargetKind::Normal => (TextureStyle::Color, Some(material_for(target))),
            TargetKind::Semantic => (TextureStyle::Semantic, Some(material_for(target))),
        };

        Self {
            target_name: target.display_name().to_string(),
            style,
            material,
        }
    }

    /// Material placed on every camera during the pass, if any.
    pub fn material(&self) -> Option<&PostProcessMaterial> {
        self.material.as_ref()
    }

    pub fn style(&self) -> TextureStyle {
        self.style
    }
}

impl SceneMutator for PostProcessMutator {
    fn prepare(
        &self,
        timeline: &mut Timeline,
        view: &mut TextureStyleManager,
    ) -> RenderResult<()> {
        if !timeline.has_cameras() {
            return Err(RenderError::prepare(
                &self.target_name,
                "no cameras bound to the timeline",
            ));
        }

        view.checkout(self.style)
            .map_err(|e| RenderError::prepare(&self.target_name, e.to_string()))?;

        for camera in timeline.cameras_mut() {
            camera.post_process.clear();
            if let Some(material) = &self.material {
                camera.post_process.push(material.clone());
            }
        }

        tracing::debug!(
            target_name = %self.target_name,
            style = ?self.style,
            cameras = timeline.camera_cuts.len(),
            "Scene prepared"
        );
        Ok(())
    }

    fn finalize(
        &self,
        timeline: &mut Timeline,
        view: &mut TextureStyleManager,
    ) -> RenderResult<()> {
        timeline.clear_post_process();

        if self.style != TextureStyle::Color {
            view.checkout(TextureStyle::Color)
                .map_err(|e| RenderError::finalize(&self.target_name, e.to_string()))?;
        }

        tracing::debug!(target_name = %self.target_name, "Scene finalized");
        Ok(())
    }
}
