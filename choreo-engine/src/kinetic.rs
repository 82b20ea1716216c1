//! Kinetic DAG state machine: a fixed graph of movement nodes with energy gates, minimum-dwell
//! locks, and probabilistic transitions.

use std::collections::HashMap;

use choreo_analysis::{AudioSample, BeatUpdate};
use choreo_frames::{Direction, Energy, FramePool, FrameType};
use rand::rngs::StdRng;
use rand::Rng;

use crate::decision::TransitionMode;
use crate::selection::pick_uniform;

const TRANSITION_PROBABILITY: f32 = 0.30;
const MAX_POSE_RESAMPLES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KineticNodeId {
    Idle,
    GrooveLeft,
    GrooveRight,
    GrooveCenter,
    Crouch,
    Jump,
    VogueLeft,
    VogueRight,
    Closeup,
    Hands,
    Feet,
    Mandala,
    Impact,
    Acrobatic,
}

use KineticNodeId::*;

const ALL_NODES: [KineticNodeId; 14] = [
    Idle, GrooveLeft, GrooveRight, GrooveCenter, Crouch, Jump, VogueLeft, VogueRight, Closeup,
    Hands, Feet, Mandala, Impact, Acrobatic,
];

#[derive(Debug, Clone)]
pub struct KineticNodeDef {
    pub energy_required: f32,
    pub exit_threshold: f32,
    pub min_duration_ms: u64,
    pub neighbors: Vec<KineticNodeId>,
    pub mechanical_fx: Vec<&'static str>,
}

fn node_def(id: KineticNodeId) -> KineticNodeDef {
    use KineticNodeId as N;
    let (energy_required, exit_threshold, min_duration_ms, neighbors, mechanical_fx): (
        f32,
        f32,
        u64,
        Vec<N>,
        Vec<&'static str>,
    ) = match id {
        N::Idle => (0.0, 0.0, 0, vec![N::GrooveLeft, N::GrooveRight, N::GrooveCenter], vec![]),
        N::GrooveLeft => (
            0.2,
            0.15,
            0,
            vec![N::Idle, N::Crouch, N::Jump, N::VogueLeft, N::VogueRight, N::Closeup],
            vec!["sway"],
        ),
        N::GrooveRight => (
            0.2,
            0.15,
            0,
            vec![N::Idle, N::Crouch, N::Jump, N::VogueLeft, N::VogueRight, N::Closeup],
            vec!["sway"],
        ),
        N::GrooveCenter => (
            0.2,
            0.15,
            0,
            vec![N::Idle, N::Crouch, N::Jump, N::Feet, N::Closeup],
            vec!["sway"],
        ),
        N::Crouch => (0.3, 0.25, 0, vec![N::Idle, N::Jump, N::GrooveCenter], vec!["squash"]),
        N::Jump => (0.45, 0.35, 0, vec![N::Idle, N::Acrobatic, N::Impact], vec!["bounce_up"]),
        N::VogueLeft => (0.5, 0.4, 600, vec![N::Idle, N::Closeup, N::Hands], vec!["pose_hold"]),
        N::VogueRight => (0.5, 0.4, 600, vec![N::Idle, N::Closeup, N::Hands], vec!["pose_hold"]),
        N::Closeup => (
            0.55,
            0.45,
            600,
            vec![N::Idle, N::VogueLeft, N::VogueRight, N::Hands],
            vec!["zoom"],
        ),
        N::Hands => (0.5, 0.4, 0, vec![N::Idle, N::Closeup, N::Mandala], vec!["gesture"]),
        N::Feet => (0.4, 0.3, 0, vec![N::Idle, N::GrooveCenter], vec!["stomp"]),
        N::Mandala => (0.65, 0.55, 800, vec![N::Idle, N::Hands], vec!["rotate_slow"]),
        N::Impact => (0.75, 0.6, 500, vec![N::Idle, N::Jump, N::Acrobatic], vec!["flash", "shake"]),
        N::Acrobatic => (0.7, 0.55, 700, vec![N::Idle, N::Jump, N::Impact], vec!["spin"]),
    };
    KineticNodeDef { energy_required, exit_threshold, min_duration_ms, neighbors, mechanical_fx }
}

fn graph() -> HashMap<KineticNodeId, KineticNodeDef> {
    ALL_NODES.iter().map(|&id| (id, node_def(id))).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceMode {
    Groove,
    Emote,
    Impact,
    Footwork,
}

/// Transition mode and beat-impulse flash are properties of the sequence mode itself, not of
/// the particular frame picked for it — this lets callers with multiple sequencer decks apply
/// one set of physics/effects impulses per tick regardless of how many decks are gathered.
pub fn transition_for_mode(mode: SequenceMode) -> (TransitionMode, f32) {
    match mode {
        SequenceMode::Emote => (TransitionMode::ZoomIn, 0.0),
        SequenceMode::Footwork => (TransitionMode::Cut, 0.0),
        SequenceMode::Impact => (TransitionMode::Cut, 0.5),
        SequenceMode::Groove => (TransitionMode::Slide, 0.0),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameSelection {
    pub frame_id: choreo_frames::FrameId,
    pub transition_mode: TransitionMode,
    pub flash_add: f32,
}

#[derive(Debug, Clone)]
pub struct KineticDecision {
    pub current_node: KineticNodeId,
    pub previous_node: KineticNodeId,
    pub sequence_mode: SequenceMode,
    pub is_locked: bool,
    pub did_select_frame: bool,
    pub selected_frame: Option<choreo_frames::FrameId>,
    pub transition_mode: Option<TransitionMode>,
    pub transition_speed: f32,
    pub flash_add: f32,
}

/// Owns the fixed movement graph and the engine's current position in it.
pub struct KineticStateMachine {
    graph: HashMap<KineticNodeId, KineticNodeDef>,
    current_node: KineticNodeId,
    previous_node: KineticNodeId,
    is_locked: bool,
    lock_release_time: u64,
    last_pose: Option<String>,
    last_sequence_mode: SequenceMode,
}

impl KineticStateMachine {
    pub fn new() -> Self {
        Self {
            graph: graph(),
            current_node: KineticNodeId::Idle,
            previous_node: KineticNodeId::Idle,
            is_locked: false,
            lock_release_time: 0,
            last_pose: None,
            last_sequence_mode: SequenceMode::Groove,
        }
    }

    pub fn current_sequence_mode(&self) -> SequenceMode {
        self.last_sequence_mode
    }

    pub fn current_node(&self) -> KineticNodeId {
        self.current_node
    }

    fn sequence_mode(
        &self,
        sample: &AudioSample,
        beat: &BeatUpdate,
        closeups_available: bool,
        hands_available: bool,
        feet_available: bool,
    ) -> SequenceMode {
        if sample.high > 0.7 && closeups_available {
            SequenceMode::Emote
        } else if sample.bass > 0.8 && hands_available {
            SequenceMode::Impact
        } else if beat.bar_counter >= 12 && feet_available {
            SequenceMode::Footwork
        } else if beat.phrase_counter == 7 {
            SequenceMode::Impact
        } else {
            SequenceMode::Groove
        }
    }

    /// Advances the lock/transition state machine for one tick and returns the sequence mode
    /// this tick should select frames under. Does not itself select a frame — callers drive
    /// selection separately (directly, or via the mixer's `gather_frames`) so a single state
    /// transition governs every sequencer deck in the same tick.
    pub fn advance(
        &mut self,
        pool: &FramePool,
        sample: &AudioSample,
        beat: &BeatUpdate,
        now_ms: u64,
        rng: &mut StdRng,
    ) -> SequenceMode {
        let closeups_available = !pool.by_type(FrameType::Closeup).is_empty();
        let hands_available = !pool.by_type(FrameType::Hands).is_empty();
        let feet_available = !pool.by_type(FrameType::Feet).is_empty();

        let sequence_mode =
            self.sequence_mode(sample, beat, closeups_available, hands_available, feet_available);

        if self.is_locked && now_ms < self.lock_release_time {
            // held: no transition, but beat-driven frame selection still pulses.
        } else {
            self.is_locked = false;
            let energy = (sample.bass + sample.mid + sample.high) / 3.0;
            let current_def = self.graph[&self.current_node].clone();
            if energy > current_def.exit_threshold {
                let candidates: Vec<KineticNodeId> = current_def
                    .neighbors
                    .iter()
                    .copied()
                    .filter(|n| energy >= self.graph[n].energy_required)
                    .collect();
                if !candidates.is_empty() && rng.gen_range(0.0..1.0) < TRANSITION_PROBABILITY {
                    let chosen = candidates[rng.gen_range(0..candidates.len())];
                    self.previous_node = self.current_node;
                    self.current_node = chosen;
                    let chosen_def = &self.graph[&chosen];
                    if chosen_def.min_duration_ms >= 500 {
                        self.is_locked = true;
                        self.lock_release_time = now_ms + chosen_def.min_duration_ms;
                    }
                }
            }
        }

        self.last_sequence_mode = sequence_mode;
        sequence_mode
    }

    /// Convenience single-pool tick: `advance` followed by frame selection against `pool` on a
    /// detected beat. Used directly by tests and by callers with only one active pool.
    pub fn update(
        &mut self,
        pool: &FramePool,
        sample: &AudioSample,
        beat: &BeatUpdate,
        now_ms: u64,
        rng: &mut StdRng,
    ) -> KineticDecision {
        let sequence_mode = self.advance(pool, sample, beat, now_ms, rng);

        let mut decision = KineticDecision {
            current_node: self.current_node,
            previous_node: self.previous_node,
            sequence_mode,
            is_locked: self.is_locked,
            did_select_frame: false,
            selected_frame: None,
            transition_mode: None,
            transition_speed: 0.0,
            flash_add: 0.0,
        };

        if beat.beat_detected {
            if let Some(selection) = self.pick_frame(pool, sequence_mode, beat, rng) {
                decision.did_select_frame = true;
                decision.selected_frame = Some(selection.frame_id);
                decision.transition_mode = Some(selection.transition_mode);
                decision.transition_speed = selection.transition_mode.default_speed();
                decision.flash_add = selection.flash_add;
            }
        }

        decision
    }

    /// Selects a frame from `pool` for the given sequence mode. Used both by `update` (against
    /// the primary deck) and by the mixer's `gather_frames` closure for every other sequencer
    /// deck — duplicate-pose avoidance is tracked once, globally, across all decks.
    pub fn pick_frame(
        &mut self,
        pool: &FramePool,
        mode: SequenceMode,
        beat: &BeatUpdate,
        rng: &mut StdRng,
    ) -> Option<FrameSelection> {
        let mut flash_add = 0.0;
        let (candidates, transition): (Vec<choreo_frames::FrameId>, TransitionMode) = match mode {
            SequenceMode::Emote => {
                let mut ids: Vec<_> = pool.by_type(FrameType::Closeup).to_vec();
                // "virtuals" — flourish-role frames, the closest named role to a virtual pose.
                ids.extend(
                    pool.frames()
                        .iter()
                        .filter(|f| f.role == choreo_frames::Role::Flourish)
                        .map(|f| f.id),
                );
                (ids, TransitionMode::ZoomIn)
            }
            SequenceMode::Footwork => {
                let feet = pool.by_type(FrameType::Feet);
                let ids = if feet.is_empty() {
                    pool.by_energy(Energy::Mid).to_vec()
                } else {
                    feet.to_vec()
                };
                (ids, TransitionMode::Cut)
            }
            SequenceMode::Impact => {
                let mandala = pool.by_type(FrameType::Mandala);
                let hands = pool.by_type(FrameType::Hands);
                let high = pool.by_energy(Energy::High);
                let ids = if !mandala.is_empty() {
                    mandala.to_vec()
                } else if !hands.is_empty() {
                    hands.to_vec()
                } else {
                    high.to_vec()
                };
                flash_add = 0.5;
                (ids, TransitionMode::Cut)
            }
            SequenceMode::Groove => {
                let direction = if beat.bar_counter % 2 == 0 { Direction::Left } else {
                    Direction::Right
                };
                let ids: Vec<_> = pool
                    .by_energy(Energy::Mid)
                    .iter()
                    .copied()
                    .filter(|id| pool.get(*id).map(|f| f.direction) == Some(direction))
                    .collect();
                (ids, TransitionMode::Slide)
            }
        };

        let previous_pose = self.last_pose.clone();
        let picked = pick_uniform(
            pool,
            &candidates,
            previous_pose.as_deref(),
            MAX_POSE_RESAMPLES,
            rng,
        );

        picked.map(|id| {
            self.last_pose = pool.get(id).map(|f| f.pose.clone());
            FrameSelection { frame_id: id, transition_mode: transition, flash_add }
        })
    }

    pub fn reset(&mut self) {
        self.current_node = KineticNodeId::Idle;
        self.previous_node = KineticNodeId::Idle;
        self.is_locked = false;
        self.lock_release_time = 0;
        self.last_pose = None;
        self.last_sequence_mode = SequenceMode::Groove;
    }

    /// Forces the current node directly (used by the kinetic-lock scenario and by tests).
    pub fn force_node(&mut self, node: KineticNodeId, now_ms: u64) {
        self.previous_node = self.current_node;
        self.current_node = node;
        let def = &self.graph[&node];
        if def.min_duration_ms >= 500 {
            self.is_locked = true;
            self.lock_release_time = now_ms + def.min_duration_ms;
        }
    }
}

impl Default for KineticStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_analysis::PhraseSection;
    use choreo_frames::{Category, Energy as FEnergy, Frame, FrameId, Role};
    use rand::SeedableRng;

    fn sample_frame(id: u32, frame_type: FrameType, energy: FEnergy, direction: Direction) -> Frame {
        Frame {
            id: FrameId(id),
            image_handle: format!("f{id}"),
            energy,
            direction,
            frame_type,
            role: Role::Base,
            pose: format!("pose{id}"),
            derived_from: None,
            weight: 1.0,
            preferred_transitions: Vec::new(),
            best_phases: Vec::new(),
        }
    }

    fn beat_update(bar_counter: u32, phrase_counter: u32, beat_detected: bool) -> BeatUpdate {
        BeatUpdate {
            bpm: 120.0,
            confidence: 1.0,
            beat_detected,
            beat_pos: 0.0,
            bar_counter,
            phrase_counter,
            phrase_section: PhraseSection::Intro,
        }
    }

    #[test]
    fn lock_holds_current_node_for_its_full_duration() {
        let mut machine = KineticStateMachine::new();
        let mut pool = FramePool::new(Category::Character);
        pool.load(vec![sample_frame(0, FrameType::Closeup, FEnergy::High, Direction::Center)]);
        let mut rng = StdRng::seed_from_u64(7);

        machine.force_node(KineticNodeId::Closeup, 0);
        assert!(machine.is_locked);

        let sample = AudioSample { bass: 0.9, mid: 0.9, high: 0.9, energy: 0.9, timestamp_ms: 100 };
        let beat = beat_update(0, 0, false);
        let decision = machine.update(&pool, &sample, &beat, 400, &mut rng);
        assert_eq!(decision.current_node, KineticNodeId::Closeup);

        let decision = machine.update(&pool, &sample, &beat, 501, &mut rng);
        assert!(!decision.is_locked || decision.current_node == KineticNodeId::Closeup);
    }

    #[test]
    fn silent_audio_never_leaves_idle() {
        let mut machine = KineticStateMachine::new();
        let pool = FramePool::new(Category::Character);
        let mut rng = StdRng::seed_from_u64(3);
        let sample = AudioSample { bass: 0.0, mid: 0.0, high: 0.0, energy: 0.0, timestamp_ms: 0 };
        let beat = beat_update(0, 0, false);
        for tick in 0..200u64 {
            machine.update(&pool, &sample, &beat, tick * 16, &mut rng);
        }
        assert_eq!(machine.current_node(), KineticNodeId::Idle);
    }
}
