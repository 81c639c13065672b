//! Background processing
//!
//! A single worker drains the queue through the analysis pipeline under the
//! control of a pausable run state machine.

pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod review;
pub mod state;
pub mod tags;

pub use events::{ProcessingEvent, RunCounters, Stage};
pub use orchestrator::{Orchestrator, OrchestratorStatus};
pub use pipeline::{needs_review, Adapters, FALLBACK_MODEL, NO_TEXT_TAG};
pub use review::{ReviewEdits, ReviewQueue, MANUAL_MODEL};
pub use state::{allowed_actions, transition, ControlAction, RunState, Transition};
pub use tags::normalize_tags;
