//! SeqSynth Sequence Model
//!
//! Defines the data the render orchestrator operates on:
//! - **Timeline:** The recorded camera path, split into camera cut
//!   sections, each bound to a camera with its own post-process stack
//! - **View state:** The texture style (original colors or semantic
//!   class colors) currently applied to the scene
//!
//! Timelines are shared between the caller and the renderer as
//! `Arc<Mutex<Timeline>>`; the renderer only ever keeps a `Weak`
//! handle to them.

pub mod style;
pub mod timeline;

pub use style::*;
pub use timeline::*;
