//! SeqSynth Render Engine
//!
//! Renders several image modalities of one recorded camera timeline by
//! running one host render job per modality, strictly in sequence.
//!
//! # Run Architecture
//!
//! ```text
//! TargetSelection ──► select_targets ──► RenderQueue [Color, Depth, ...]
//!                                              │ pop_front
//!                                              ▼
//!                 ┌──────────── SequenceRenderer ────────────┐
//!                 │  SceneMutator::prepare (timeline, view)  │
//!                 │  Scheduler::delay (grace period)         │
//!                 │  JobExecutor::submit ──► JobHandle       │
//!                 │  ... completion callback ...             │
//!                 │  SceneMutator::finalize                  │
//!                 └──────────────────┬───────────────────────┘
//!                                    ▼
//!                    CompletionNotifier ──► RunOutcome
//! ```
//!
//! Each target writes to `<output>/<TargetName>/`.

pub mod host;
pub mod manifest;
pub mod mutator;
pub mod notifier;
pub mod renderer;
pub mod target;

pub use host::*;
pub use mutator::*;
pub use notifier::*;
pub use renderer::*;
pub use target::*;
