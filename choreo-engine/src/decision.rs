//! Per-tick render output: the frame(s) to display, how to transition into them, and the
//! physics/effects state to apply alongside them.

use choreo_frames::FrameId;

use crate::kinetic::SequenceMode;
use crate::physics::{EffectsState, PhysicsState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    Cut,
    Slide,
    Morph,
    ZoomIn,
    CrossFade,
}

impl TransitionMode {
    /// Default transition speed (progress units per second) used when a mode-specific value
    /// hasn't been set explicitly.
    pub fn default_speed(self) -> f32 {
        match self {
            TransitionMode::Cut => 100.0,
            TransitionMode::Slide => 8.0,
            TransitionMode::Morph => 5.0,
            TransitionMode::CrossFade => 3.0,
            TransitionMode::ZoomIn => 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayeredFrame {
    pub frame_id: FrameId,
    pub opacity: f32,
    pub blend_mode: BlendMode,
}

/// The complete output of one `Engine::update` tick, handed to the renderer.
#[derive(Debug, Clone)]
pub struct RenderDecision {
    pub sequencer_frames: Vec<FrameId>,
    pub layer_frames: Vec<LayeredFrame>,
    pub transition_mode: Option<TransitionMode>,
    pub transition_speed: f32,
    pub physics: PhysicsState,
    pub effects: EffectsState,
    /// Whether a new frame was actually selected this tick, as opposed to the previous tick's
    /// frame being held over (grace window, no beat, micro-expression).
    pub did_select_frame: bool,
    pub is_transitioning: bool,
    pub sequence_mode: Option<SequenceMode>,
    pub crossfader_position: f32,
}

impl RenderDecision {
    pub fn empty(physics: PhysicsState, effects: EffectsState) -> Self {
        Self {
            sequencer_frames: Vec::new(),
            layer_frames: Vec::new(),
            transition_mode: None,
            transition_speed: 0.0,
            physics,
            effects,
            did_select_frame: false,
            is_transitioning: false,
            sequence_mode: None,
            crossfader_position: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cut_is_the_fastest_transition() {
        let speeds = [
            TransitionMode::Cut,
            TransitionMode::Slide,
            TransitionMode::Morph,
            TransitionMode::ZoomIn,
            TransitionMode::CrossFade,
        ]
        .map(TransitionMode::default_speed);
        assert_eq!(speeds.iter().cloned().fold(f32::MIN, f32::max), TransitionMode::Cut.default_speed());
    }

    #[test]
    fn empty_decision_carries_no_frames_or_transition() {
        let decision = RenderDecision::empty(PhysicsState::default(), EffectsState::default());
        assert!(decision.sequencer_frames.is_empty());
        assert!(decision.layer_frames.is_empty());
        assert!(decision.transition_mode.is_none());
    }
}
