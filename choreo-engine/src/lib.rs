//! Kinetic/pattern selection, the 4-deck mixer, physics integration, and the top-level
//! dual-mode orchestrator.

mod commands;
mod decision;
mod engine;
mod error;
mod kinetic;
mod mixer;
mod pattern;
mod physics;
mod selection;

pub use commands::{EngineCommand, EngineEvent, EngineMode, PlaybackMode, TriggerKind};
pub use decision::{BlendMode, LayeredFrame, RenderDecision, TransitionMode};
pub use engine::{Engine, Telemetry};
pub use error::EngineError;
pub use kinetic::{
    transition_for_mode, FrameSelection, KineticDecision, KineticNodeId, KineticStateMachine,
    SequenceMode,
};
pub use mixer::{Deck, DeckMixer, DeckRole, DECK_COUNT};
pub use pattern::{PatternDecision, PatternId, PatternSequencer};
pub use physics::{EffectsState, PhysicsIntegrator, PhysicsState, Trigger};
