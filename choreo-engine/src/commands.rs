use std::sync::Arc;

use choreo_frames::FramePool;

use crate::kinetic::SequenceMode;
use crate::mixer::DeckRole;
use crate::pattern::PatternId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Kinetic,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    File,
    Stream,
    Mic,
}

/// Inbound commands accepted by `Engine::handle_command`. Pool loads carry an `Arc` so a large
/// frame-set is moved into the channel once, not copied per tick.
pub enum EngineCommand {
    LoadDeckPool(usize, Arc<FramePool>),
    SetDeckRole(usize, DeckRole),
    SetDeckOpacity(usize, f32),
    SetCrossfader(f32),
    SetEngineMode(EngineMode),
    SetPattern(PatternId),
    SetSequenceMode(SequenceMode),
    SetPlaybackMode(PlaybackMode),
    /// One-shot pre-integrator impulses from the touch/input surface, distinct from
    /// `SetTrigger`'s persistent toggles below.
    TriggerBurst,
    TriggerFreeze,
    /// `set_trigger(stutter|reverse|glitch|burst, bool)`: toggles a named trigger on or off
    /// rather than firing a single impulse. Stays active across ticks until toggled off.
    SetTrigger(TriggerKind, bool),
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Stutter,
    Reverse,
    Glitch,
    Burst,
}

/// Persistent on/off state for the four `set_trigger` kinds, applied every tick while active.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerToggles {
    pub stutter: bool,
    pub reverse: bool,
    pub glitch: bool,
    pub burst: bool,
}

impl TriggerToggles {
    pub fn set(&mut self, kind: TriggerKind, on: bool) {
        match kind {
            TriggerKind::Stutter => self.stutter = on,
            TriggerKind::Reverse => self.reverse = on,
            TriggerKind::Glitch => self.glitch = on,
            TriggerKind::Burst => self.burst = on,
        }
    }
}

/// Outbound notifications. Deliberately minimal: the engine core is pull-based
/// (`Engine::get_telemetry`); anything resembling periodic push state belongs at the edge.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    DeckLoaded { deck_index: usize, frame_count: usize },
    Error(String),
}
