//! Texture-style view state.
//!
//! The scene is either shown with its original textures or with every
//! object painted in the flat color of its semantic class. The style is
//! global view state: render targets switch it for their pass and the
//! renderer restores whatever was selected before the run.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::timeline::Timeline;

/// View state shared between the host and the renderer.
pub type SharedViewState = Arc<Mutex<TextureStyleManager>>;

/// Which textures the scene is shown with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureStyle {
    /// Original object textures.
    #[default]
    Color,
    /// Flat semantic class colors.
    Semantic,
}

/// Tracks and switches the active texture style.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextureStyleManager {
    selected: TextureStyle,

    /// Number of semantic classes the semantic style can paint with.
    semantic_classes: usize,

    /// Number of style switches performed, for diagnostics.
    #[serde(skip)]
    checkouts: u64,
}

impl TextureStyleManager {
    pub fn new(selected: TextureStyle, semantic_classes: usize) -> Self {
        Self {
            selected,
            semantic_classes,
            checkouts: 0,
        }
    }

    /// Manager whose semantic palette comes from the timeline.
    pub fn for_timeline(timeline: &Timeline) -> Self {
        Self::new(TextureStyle::Color, timeline.semantic_classes.len())
    }

    /// Wrap the manager for sharing with a renderer.
    pub fn into_shared(self) -> SharedViewState {
        Arc::new(Mutex::new(self))
    }

    pub fn selected_style(&self) -> TextureStyle {
        self.selected
    }

    pub fn semantic_classes(&self) -> usize {
        self.semantic_classes
    }

    pub fn set_semantic_classes(&mut self, count: usize) {
        self.semantic_classes = count;
    }

    pub fn checkouts(&self) -> u64 {
        self.checkouts
    }

    /// Switch the scene to `style`. Checking out the already selected
    /// style is a no-op.
    pub fn checkout(&mut self, style: TextureStyle) -> Result<(), StyleError> {
        if style == self.selected {
            return Ok(());
        }
        if style == TextureStyle::Semantic && self.semantic_classes == 0 {
            return Err(StyleError::NoSemanticClasses);
        }
        self.selected = style;
        self.checkouts += 1;
        Ok(())
    }
}

/// Errors raised while switching texture styles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StyleError {
    #[error("No semantic classes defined; cannot switch to the semantic texture style")]
    NoSemanticClasses,
}
