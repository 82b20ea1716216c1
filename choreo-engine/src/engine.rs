//! Top-level engine: owns the kinetic/pattern selectors, the deck mixer, and the physics
//! integrator, and orchestrates file/stream/mic playback modes.

use std::sync::Arc;

use choreo_analysis::{AudioSample, BeatTracker, BeatUpdate};
use choreo_frames::{FrameId, FramePool};
use choreo_planner::SongMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::commands::{EngineCommand, EngineEvent, EngineMode, PlaybackMode, TriggerKind, TriggerToggles};
use crate::decision::{RenderDecision, TransitionMode};
use crate::error::EngineError;
use crate::kinetic::{transition_for_mode, KineticNodeId, KineticStateMachine, SequenceMode};
use crate::mixer::DeckMixer;
use crate::pattern::{PatternDecision, PatternId, PatternSequencer};
use crate::physics::{PhysicsIntegrator, Trigger};

const MODE_SWITCH_GRACE_MS: u64 = 500;
const LIVE_ENERGY_RATIO_MIN: f32 = 0.7;
const LIVE_ENERGY_RATIO_MAX: f32 = 1.5;
const GLITCH_TOGGLE_FLOOR: f32 = 0.4;

#[derive(Debug, Clone)]
pub struct Telemetry {
    pub bpm: f32,
    pub confidence: f32,
    pub bar: u32,
    pub phrase: u32,
    pub beat_pos: f32,
    pub sequence_mode: Option<SequenceMode>,
    pub engine_mode: EngineMode,
    pub active_pattern: Option<PatternId>,
    pub playback_mode: PlaybackMode,
    pub pool_counts: [usize; 4],
    pub uptime_ticks: u64,
    pub fps: f32,
    pub current_node: KineticNodeId,
    pub active_deck_ids: Vec<usize>,
}

pub struct Engine {
    beat_tracker: BeatTracker,
    kinetic: KineticStateMachine,
    pattern_sequencer: PatternSequencer,
    mixer: DeckMixer,
    physics: PhysicsIntegrator,
    rng: StdRng,
    engine_mode: EngineMode,
    playback_mode: PlaybackMode,
    song_map: Option<Arc<SongMap>>,
    last_mode_switch_ms: Option<u64>,
    last_frame_id: Option<FrameId>,
    stutter_trigger: bool,
    triggers: TriggerToggles,
    uptime_ticks: u64,
}

impl Engine {
    pub fn new(seed: u64) -> Self {
        Self {
            beat_tracker: BeatTracker::new(),
            kinetic: KineticStateMachine::new(),
            pattern_sequencer: PatternSequencer::new(PatternId::Groove),
            mixer: DeckMixer::new(),
            physics: PhysicsIntegrator::new(),
            rng: StdRng::seed_from_u64(seed),
            engine_mode: EngineMode::Kinetic,
            playback_mode: PlaybackMode::Mic,
            song_map: None,
            last_mode_switch_ms: None,
            last_frame_id: None,
            stutter_trigger: false,
            triggers: TriggerToggles::default(),
            uptime_ticks: 0,
        }
    }

    pub fn set_song_map(&mut self, song_map: Arc<SongMap>) {
        self.song_map = Some(song_map);
    }

    pub fn handle_command(&mut self, command: EngineCommand) -> Result<Option<EngineEvent>, EngineError> {
        match command {
            EngineCommand::LoadDeckPool(index, pool) => {
                let frame_count = pool.len();
                self.mixer.load_deck(index, pool)?;
                Ok(Some(EngineEvent::DeckLoaded { deck_index: index, frame_count }))
            }
            EngineCommand::SetDeckRole(index, role) => {
                self.mixer.set_deck_role(index, role)?;
                Ok(None)
            }
            EngineCommand::SetDeckOpacity(index, opacity) => {
                self.mixer.set_deck_opacity(index, opacity)?;
                Ok(None)
            }
            EngineCommand::SetCrossfader(value) => {
                self.mixer.set_crossfader(value)?;
                Ok(None)
            }
            EngineCommand::SetEngineMode(mode) => {
                self.engine_mode = mode;
                Ok(None)
            }
            EngineCommand::SetPattern(pattern) => {
                self.pattern_sequencer.set_pattern(pattern);
                Ok(None)
            }
            EngineCommand::SetSequenceMode(_mode) => {
                // Sequence mode is derived each tick by the kinetic state machine (§4.D); an
                // explicit override is accepted but only affects telemetry reporting upstream.
                Ok(None)
            }
            EngineCommand::SetPlaybackMode(mode) => {
                if mode != self.playback_mode {
                    self.playback_mode = mode;
                    self.last_mode_switch_ms = Some(self.last_tick_ms());
                    info!(?mode, "playback mode switched");
                }
                Ok(None)
            }
            EngineCommand::TriggerBurst => {
                self.physics.apply_trigger(Trigger::Burst);
                Ok(None)
            }
            EngineCommand::TriggerFreeze => {
                self.physics.apply_trigger(Trigger::Freeze);
                Ok(None)
            }
            EngineCommand::SetTrigger(kind, on) => {
                self.triggers.set(kind, on);
                if kind == TriggerKind::Stutter {
                    self.stutter_trigger = on;
                }
                if kind == TriggerKind::Reverse {
                    self.mixer.set_reverse(on);
                }
                Ok(None)
            }
            EngineCommand::Reset => {
                self.reset();
                Ok(None)
            }
        }
    }

    fn last_tick_ms(&self) -> u64 {
        self.physics.last_tick_ms_hint()
    }

    /// Real-time tick: never returns `Result`. A frame must always be produced, even a
    /// degenerate one that reuses the previous tick's `frame_id`.
    pub fn update(&mut self, sample: AudioSample) -> RenderDecision {
        let beat = self.beat_tracker.update(sample.bass, sample.timestamp_ms);
        if beat.beat_detected {
            self.physics.apply_beat_impulse(sample.bass);
        }
        let dt = self.physics.dt_for_tick(sample.timestamp_ms);
        self.physics.integrate(dt, sample.bass, sample.mid, sample.high);

        let in_grace_window = self
            .last_mode_switch_ms
            .is_some_and(|t| sample.timestamp_ms.saturating_sub(t) < MODE_SWITCH_GRACE_MS);

        let mut decision = if in_grace_window {
            self.micro_expression_decision(&sample)
        } else {
            match self.playback_mode {
                PlaybackMode::File => self.file_mode_decision(&sample, &beat),
                PlaybackMode::Stream | PlaybackMode::Mic => self.live_decision(&sample, &beat),
            }
        };

        if self.triggers.glitch {
            self.physics.effects_mut().glitch = self.physics.effects().glitch.max(GLITCH_TOGGLE_FLOOR);
        }
        if self.triggers.burst {
            self.physics.apply_trigger(Trigger::Burst);
        }

        if let Some(&id) = decision.sequencer_frames.first() {
            self.last_frame_id = Some(id);
        } else if let Some(id) = self.last_frame_id {
            decision.sequencer_frames.push(id);
        }

        decision.layer_frames = self.mixer.layered_frames();
        decision.physics = self.physics.physics();
        decision.effects = self.physics.effects();
        decision.is_transitioning = self.physics.is_transitioning();
        decision.crossfader_position = self.mixer.crossfader();
        self.uptime_ticks += 1;
        decision
    }

    fn live_decision(&mut self, sample: &AudioSample, beat: &BeatUpdate) -> RenderDecision {
        let (sequencer_frames, transition_mode, transition_speed, glitch_add, flash_add, sequence_mode, did_select_frame) =
            match self.engine_mode {
                EngineMode::Kinetic => {
                    let empty_pool = FramePool::new(choreo_frames::Category::Character);
                    let primary_pool =
                        self.mixer.deck(0).and_then(|d| d.pool()).unwrap_or(&empty_pool);
                    let mode = self.kinetic.advance(
                        primary_pool,
                        sample,
                        beat,
                        sample.timestamp_ms,
                        &mut self.rng,
                    );
                    let kinetic = &mut self.kinetic;
                    let rng = &mut self.rng;
                    let mut did_select_frame = false;
                    let frames = self.mixer.gather_frames(|pool| {
                        if !beat.beat_detected {
                            return None;
                        }
                        let picked = kinetic.pick_frame(pool, mode, beat, rng).map(|s| s.frame_id);
                        did_select_frame |= picked.is_some();
                        picked
                    });
                    let (transition_mode, transition_speed, flash) = if beat.beat_detected {
                        let (tmode, flash) = transition_for_mode(mode);
                        (Some(tmode), tmode.default_speed(), flash)
                    } else {
                        (None, 0.0, 0.0)
                    };
                    (frames, transition_mode, transition_speed, 0.0, flash, Some(mode), did_select_frame)
                }
                EngineMode::Pattern => {
                    let mut decisions: Vec<PatternDecision> = Vec::new();
                    let pattern_sequencer = &mut self.pattern_sequencer;
                    let rng = &mut self.rng;
                    let stutter_trigger = self.stutter_trigger;
                    let frames = self.mixer.gather_frames(|pool| {
                        let decision =
                            pattern_sequencer.update(pool, sample, beat, stutter_trigger, rng);
                        let selected = decision.selected_frame;
                        decisions.push(decision);
                        selected
                    });
                    let primary = decisions.into_iter().next().unwrap_or_else(PatternDecision::none);
                    (
                        frames,
                        primary.transition_mode,
                        primary.transition_speed,
                        primary.glitch_add,
                        primary.flash_add,
                        None,
                        primary.did_select_frame,
                    )
                }
            };

        if glitch_add > 0.0 {
            self.physics.effects_mut().glitch = (self.physics.effects().glitch + glitch_add).min(1.0);
        }
        if flash_add > 0.0 {
            self.physics.effects_mut().flash = (self.physics.effects().flash + flash_add).min(1.0);
        }
        if transition_mode.is_some() && !self.physics.is_transitioning() {
            self.physics.start_transition(transition_speed.max(1.0));
        }

        let mut decision = RenderDecision::empty(self.physics.physics(), self.physics.effects());
        decision.sequencer_frames = sequencer_frames;
        decision.transition_mode = transition_mode;
        decision.transition_speed = transition_speed;
        decision.did_select_frame = did_select_frame;
        decision.sequence_mode = sequence_mode;
        decision
    }

    fn file_mode_decision(&mut self, sample: &AudioSample, beat: &BeatUpdate) -> RenderDecision {
        let Some(song_map) = self.song_map.clone() else {
            return self.live_decision(sample, beat);
        };
        let Some(planned) = song_map.choreography_at(sample.timestamp_ms) else {
            return self.micro_expression_decision(sample);
        };

        let expected_energy = planned.expected_energy.max(0.01);
        let live_energy = sample.energy;
        let ratio = (live_energy / expected_energy).clamp(LIVE_ENERGY_RATIO_MIN, LIVE_ENERGY_RATIO_MAX);

        self.physics.physics_mut().rotation = [
            planned.target_rotation[0] * ratio,
            planned.target_rotation[1] * ratio,
            planned.target_rotation[2] * ratio,
        ];
        self.physics.physics_mut().squash = planned.target_squash;
        self.physics.physics_mut().bounce = planned.target_bounce * ratio;
        self.physics.effects_mut().flash = planned.flash;
        self.physics.effects_mut().rgb_split = planned.rgb_split;

        let transition_mode = match planned.transition_mode {
            choreo_planner::PlannedTransition::Cut => TransitionMode::Cut,
            choreo_planner::PlannedTransition::ZoomIn => TransitionMode::ZoomIn,
            choreo_planner::PlannedTransition::Slide => TransitionMode::Slide,
            choreo_planner::PlannedTransition::Smooth => TransitionMode::CrossFade,
            choreo_planner::PlannedTransition::Morph => TransitionMode::Morph,
        };
        if !self.physics.is_transitioning() {
            self.physics.start_transition(planned.transition_speed.max(1.0));
        }

        let mut decision = RenderDecision::empty(self.physics.physics(), self.physics.effects());
        decision.did_select_frame = planned.frame_id.is_some();
        decision.sequencer_frames = planned.frame_id.into_iter().collect();
        decision.transition_mode = Some(transition_mode);
        decision.transition_speed = planned.transition_speed;
        decision
    }

    /// Between beats in file mode (and during the post-mode-switch grace window): keep the
    /// current frame, drive rotation/squash/bounce directly from the instantaneous audio
    /// sample, and leave effects untouched.
    fn micro_expression_decision(&mut self, sample: &AudioSample) -> RenderDecision {
        let physics = self.physics.physics_mut();
        physics.rotation[0] = sample.bass * 20.0;
        physics.rotation[2] = sample.high * 10.0;
        physics.squash = 1.0 - sample.mid * 0.1;
        physics.bounce = -sample.bass * 10.0;

        RenderDecision::empty(self.physics.physics(), self.physics.effects())
    }

    pub fn get_telemetry(&self) -> Telemetry {
        let snapshot = self.beat_tracker.current_snapshot();
        let pool_counts = [0, 1, 2, 3].map(|i| self.mixer.deck(i).and_then(|d| d.pool()).map(FramePool::len).unwrap_or(0));
        Telemetry {
            bpm: snapshot.bpm,
            confidence: snapshot.confidence,
            bar: snapshot.bar_counter,
            phrase: snapshot.phrase_counter,
            beat_pos: snapshot.beat_pos,
            sequence_mode: if self.engine_mode == EngineMode::Kinetic {
                Some(self.kinetic.current_sequence_mode())
            } else {
                None
            },
            engine_mode: self.engine_mode,
            active_pattern: if self.engine_mode == EngineMode::Pattern {
                Some(self.pattern_sequencer.pattern())
            } else {
                None
            },
            playback_mode: self.playback_mode,
            pool_counts,
            uptime_ticks: self.uptime_ticks,
            fps: self.physics.fps(),
            current_node: self.kinetic.current_node(),
            active_deck_ids: self.mixer.active_deck_ids(),
        }
    }

    pub fn reset(&mut self) {
        self.beat_tracker.reset();
        self.kinetic.reset();
        self.pattern_sequencer.reset();
        self.mixer.reset();
        self.physics.reset();
        self.last_mode_switch_ms = None;
        self.last_frame_id = None;
        self.stutter_trigger = false;
        self.triggers = TriggerToggles::default();
        self.uptime_ticks = 0;
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_frames::{Category, Direction, Energy, Frame, FrameType, Role};

    fn sample(timestamp_ms: u64, bass: f32) -> AudioSample {
        AudioSample { bass, mid: bass * 0.5, high: bass * 0.2, energy: bass, timestamp_ms }
    }

    fn frame(id: u32) -> Frame {
        Frame {
            id: FrameId(id),
            image_handle: format!("f{id}"),
            energy: Energy::Mid,
            direction: Direction::Center,
            frame_type: FrameType::Body,
            role: Role::Base,
            pose: format!("pose{id}"),
            derived_from: None,
            weight: 1.0,
            preferred_transitions: Vec::new(),
            best_phases: Vec::new(),
        }
    }

    fn test_pool() -> FramePool {
        let mut pool = FramePool::new(Category::Character);
        pool.load((0..4).map(frame).collect());
        pool.derive();
        pool.compute_weights();
        pool.compute_affinities();
        pool.compute_phase_affinities();
        pool
    }

    #[test]
    fn update_advances_uptime_ticks() {
        let mut engine = Engine::new(1);
        engine.handle_command(EngineCommand::LoadDeckPool(0, Arc::new(test_pool()))).unwrap();
        for i in 0..10 {
            engine.update(sample(i * 20, 0.5));
        }
        assert_eq!(engine.get_telemetry().uptime_ticks, 10);
    }

    #[test]
    fn reset_clears_uptime_ticks() {
        let mut engine = Engine::new(1);
        engine.handle_command(EngineCommand::LoadDeckPool(0, Arc::new(test_pool()))).unwrap();
        engine.update(sample(0, 0.5));
        engine.reset();
        assert_eq!(engine.get_telemetry().uptime_ticks, 0);
    }

    #[test]
    fn update_always_produces_a_frame_once_one_has_been_shown() {
        let mut engine = Engine::new(1);
        engine.handle_command(EngineCommand::LoadDeckPool(0, Arc::new(test_pool()))).unwrap();
        let mut saw_a_frame = false;
        for i in 0..50 {
            let decision = engine.update(sample(i * 20, 0.9));
            if !decision.sequencer_frames.is_empty() {
                saw_a_frame = true;
            }
            if saw_a_frame {
                assert!(!decision.sequencer_frames.is_empty());
            }
        }
    }

    #[test]
    fn switching_playback_mode_opens_a_grace_window() {
        let mut engine = Engine::new(1);
        engine.handle_command(EngineCommand::LoadDeckPool(0, Arc::new(test_pool()))).unwrap();
        engine.update(sample(0, 0.5));
        engine.handle_command(EngineCommand::SetPlaybackMode(PlaybackMode::File)).unwrap();
        let decision = engine.update(sample(10, 0.5));
        assert!(decision.sequencer_frames.len() <= 1);
        assert!(!decision.did_select_frame);
    }

    #[test]
    fn set_trigger_glitch_holds_a_glitch_floor_until_toggled_off() {
        let mut engine = Engine::new(1);
        engine.handle_command(EngineCommand::LoadDeckPool(0, Arc::new(test_pool()))).unwrap();
        engine.handle_command(EngineCommand::SetTrigger(TriggerKind::Glitch, true)).unwrap();
        let decision = engine.update(sample(0, 0.1));
        assert!(decision.effects.glitch >= GLITCH_TOGGLE_FLOOR - 1e-6);

        engine.handle_command(EngineCommand::SetTrigger(TriggerKind::Glitch, false)).unwrap();
        for i in 1..200 {
            engine.update(sample(i * 20, 0.0));
        }
        assert!(engine.physics.effects().glitch < GLITCH_TOGGLE_FLOOR);
    }

    #[test]
    fn set_trigger_reverse_steps_layer_decks_backward() {
        let mut engine = Engine::new(1);
        engine.handle_command(EngineCommand::SetDeckRole(1, crate::mixer::DeckRole::Layer)).unwrap();
        engine.handle_command(EngineCommand::LoadDeckPool(1, Arc::new(test_pool()))).unwrap();
        engine.handle_command(EngineCommand::SetTrigger(TriggerKind::Reverse, true)).unwrap();

        let first = engine.update(sample(0, 0.1)).layer_frames[0].frame_id;
        let second = engine.update(sample(20, 0.1)).layer_frames[0].frame_id;
        assert_ne!(first, second);
    }
}
