//! Render targets and target selection.
//!
//! A target is one output modality of a render pass. The set of kinds is
//! closed; a run renders the selected kinds one after another in the
//! canonical order of [`TargetKind::ALL`].

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use seqsynth_common::error::{RenderError, RenderResult};

/// Default depth range of the depth target, in meters.
pub const DEFAULT_DEPTH_RANGE_METERS: f64 = 100.0;

/// One output modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Color,
    Depth,
    Normal,
    Semantic,
}

impl TargetKind {
    /// Every kind, in the order a run renders them.
    pub const ALL: [TargetKind; 4] = [
        TargetKind::Color,
        TargetKind::Depth,
        TargetKind::Normal,
        TargetKind::Semantic,
    ];

    /// Name used for logging and as the target's output subdirectory.
    pub fn display_name(self) -> &'static str {
        match self {
            TargetKind::Color => "ColorImage",
            TargetKind::Depth => "DepthImage",
            TargetKind::Normal => "NormalImage",
            TargetKind::Semantic => "SemanticImage",
        }
    }

    /// Short lowercase name accepted by [`FromStr`].
    pub fn short_name(self) -> &'static str {
        match self {
            TargetKind::Color => "color",
            TargetKind::Depth => "depth",
            TargetKind::Normal => "normal",
            TargetKind::Semantic => "semantic",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        TargetKind::ALL
            .into_iter()
            .find(|kind| {
                kind.short_name() == needle || kind.display_name().to_ascii_lowercase() == needle
            })
            .ok_or_else(|| {
                format!("Unknown target: {s}. Use: color, depth, normal, semantic")
            })
    }
}

/// Parameters shared by every target of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetParams {
    /// Distance mapped to full intensity in depth images (meters).
    pub depth_range_meters: f64,
}

impl Default for TargetParams {
    fn default() -> Self {
        Self {
            depth_range_meters: DEFAULT_DEPTH_RANGE_METERS,
        }
    }
}

/// Kind-specific configuration carried by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TargetParameters {
    None,
    Depth { range_meters: f64 },
}

/// Describes one target of a run. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    kind: TargetKind,
    display_name: String,
    parameters: TargetParameters,
}

impl TargetDescriptor {
    /// Build the descriptor for `kind`, pulling in whichever shared
    /// parameters that kind needs.
    pub fn new(kind: TargetKind, params: &TargetParams) -> Self {
        let parameters = match kind {
            TargetKind::Depth => TargetParameters::Depth {
                range_meters: params.depth_range_meters,
            },
            TargetKind::Color | TargetKind::Normal | TargetKind::Semantic => {
                TargetParameters::None
            }
        };
        Self {
            kind,
            display_name: kind.display_name().to_string(),
            parameters,
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn parameters(&self) -> TargetParameters {
        self.parameters
    }

    /// Depth range, for depth targets.
    pub fn depth_range_meters(&self) -> Option<f64> {
        match self.parameters {
            TargetParameters::Depth { range_meters } => Some(range_meters),
            TargetParameters::None => None,
        }
    }

    /// Directory this target's images are written to.
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        target_output_dir(root, self)
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// `root/<display name>`: the only on-disk layout the renderer dictates.
pub fn target_output_dir(root: &Path, target: &TargetDescriptor) -> PathBuf {
    root.join(target.display_name())
}

/// Which target kinds a run should render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSelection {
    flags: BTreeMap<TargetKind, bool>,
}

impl TargetSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selection with every kind enabled.
    pub fn all() -> Self {
        TargetKind::ALL
            .into_iter()
            .fold(Self::new(), |selection, kind| selection.with(kind, true))
    }

    /// Builder-style flag setter.
    pub fn with(mut self, kind: TargetKind, enabled: bool) -> Self {
        self.set(kind, enabled);
        self
    }

    pub fn set(&mut self, kind: TargetKind, enabled: bool) {
        self.flags.insert(kind, enabled);
    }

    pub fn enable(&mut self, kind: TargetKind) {
        self.set(kind, true);
    }

    pub fn is_enabled(&self, kind: TargetKind) -> bool {
        self.flags.get(&kind).copied().unwrap_or(false)
    }

    pub fn any_selected(&self) -> bool {
        self.flags.values().any(|enabled| *enabled)
    }

    pub fn enabled_count(&self) -> usize {
        self.flags.values().filter(|enabled| **enabled).count()
    }
}

impl FromIterator<TargetKind> for TargetSelection {
    fn from_iter<I: IntoIterator<Item = TargetKind>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |selection, kind| selection.with(kind, true))
    }
}

/// Ordered targets of one run, consumed front to back.
#[derive(Debug, Clone, Default)]
pub struct RenderQueue {
    targets: VecDeque<TargetDescriptor>,
}

impl RenderQueue {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Take the next target to render.
    pub fn pop_front(&mut self) -> Option<TargetDescriptor> {
        self.targets.pop_front()
    }

    pub fn peek(&self) -> Option<&TargetDescriptor> {
        self.targets.front()
    }

    /// Drop every remaining target, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let remaining = self.targets.len();
        self.targets.clear();
        remaining
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetDescriptor> {
        self.targets.iter()
    }

    pub fn kinds(&self) -> Vec<TargetKind> {
        self.targets.iter().map(TargetDescriptor::kind).collect()
    }
}

/// Build the render queue for a selection.
///
/// Fails with [`RenderError::NoTargetsSelected`] when nothing is enabled.
/// The queue follows [`TargetKind::ALL`] regardless of how the selection
/// was built and is never empty on success.
pub fn select_targets(
    selection: &TargetSelection,
    params: &TargetParams,
) -> RenderResult<RenderQueue> {
    if !selection.any_selected() {
        return Err(RenderError::NoTargetsSelected);
    }

    let targets = TargetKind::ALL
        .into_iter()
        .filter(|kind| selection.is_enabled(*kind))
        .map(|kind| TargetDescriptor::new(kind, params))
        .collect();

    Ok(RenderQueue { targets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_color_and_depth_selection() {
        let selection = TargetSelection::new()
            .with(TargetKind::Color, true)
            .with(TargetKind::Depth, true)
            .with(TargetKind::Normal, false)
            .with(TargetKind::Semantic, false);
        let params = TargetParams {
            depth_range_meters: 50.0,
        };

        let mut queue = select_targets(&selection, &params).unwrap();
        assert_eq!(queue.kinds(), vec![TargetKind::Color, TargetKind::Depth]);

        let color = queue.pop_front().unwrap();
        assert_eq!(color.parameters(), TargetParameters::None);
        let depth = queue.pop_front().unwrap();
        assert_eq!(depth.depth_range_meters(), Some(50.0));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_selection_is_rejected() {
        let selection = TargetSelection::new()
            .with(TargetKind::Color, false)
            .with(TargetKind::Semantic, false);
        let err = select_targets(&selection, &TargetParams::default()).unwrap_err();
        assert!(matches!(err, RenderError::NoTargetsSelected));

        assert!(select_targets(&TargetSelection::new(), &TargetParams::default()).is_err());
    }

    #[test]
    fn test_default_depth_range() {
        let queue = select_targets(
            &TargetSelection::from_iter([TargetKind::Depth]),
            &TargetParams::default(),
        )
        .unwrap();
        assert_eq!(
            queue.peek().and_then(TargetDescriptor::depth_range_meters),
            Some(DEFAULT_DEPTH_RANGE_METERS)
        );
    }

    #[test]
    fn test_output_dir_uses_display_name() {
        let target = TargetDescriptor::new(TargetKind::Semantic, &TargetParams::default());
        assert_eq!(
            target.output_dir(Path::new("/renders/run1")),
            PathBuf::from("/renders/run1/SemanticImage")
        );
    }

    #[test]
    fn test_parse_target_kind() {
        assert_eq!("depth".parse::<TargetKind>(), Ok(TargetKind::Depth));
        assert_eq!(" Normal ".parse::<TargetKind>(), Ok(TargetKind::Normal));
        assert_eq!("SemanticImage".parse::<TargetKind>(), Ok(TargetKind::Semantic));
        assert!("albedo".parse::<TargetKind>().is_err());
    }

    #[test]
    fn test_queue_clear_reports_discarded() {
        let mut queue = select_targets(&TargetSelection::all(), &TargetParams::default()).unwrap();
        queue.pop_front();
        assert_eq!(queue.clear(), 3);
        assert!(queue.is_empty());
    }

    fn kind_strategy() -> impl Strategy<Value = TargetKind> {
        prop::sample::select(TargetKind::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn queue_matches_enabled_flags_in_canonical_order(
            flags in prop::collection::vec((kind_strategy(), any::<bool>()), 0..12),
        ) {
            let mut selection = TargetSelection::new();
            for (kind, enabled) in &flags {
                selection.set(*kind, *enabled);
            }

            match select_targets(&selection, &TargetParams::default()) {
                Ok(queue) => {
                    prop_assert_eq!(queue.len(), selection.enabled_count());
                    let expected: Vec<TargetKind> = TargetKind::ALL
                        .into_iter()
                        .filter(|kind| selection.is_enabled(*kind))
                        .collect();
                    prop_assert_eq!(queue.kinds(), expected);
                }
                Err(err) => {
                    prop_assert!(matches!(err, RenderError::NoTargetsSelected));
                    prop_assert!(!selection.any_selected());
                }
            }
        }
    }
}
