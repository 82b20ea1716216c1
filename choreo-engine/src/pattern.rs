//! Pattern sequencer: 15 named patterns, each a fixed pool/rule/transition recipe, run instead
//! of the kinetic state machine when engine mode is `pattern`.

use choreo_analysis::{AudioSample, BeatUpdate};
use choreo_frames::{Direction, Energy, FramePool, FrameId, FrameType};
use rand::rngs::StdRng;
use rand::Rng;

use crate::decision::TransitionMode;
use crate::selection::pick_uniform;

const MAX_POSE_RESAMPLES: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternId {
    PingPong,
    Abab,
    Aabb,
    Abac,
    Stutter,
    SnareRoll,
    BuildDrop,
    Impact,
    Vogue,
    Flow,
    Chaos,
    Minimal,
    Groove,
    Emote,
    Footwork,
}

/// How often a cached-letter pattern (abab/aabb/abac) re-rolls its A/B/C slots.
fn refresh_bars(id: PatternId) -> u32 {
    match id {
        PatternId::Abac => 8,
        PatternId::Abab | PatternId::Aabb => 4,
        _ => 4,
    }
}

#[derive(Debug, Clone)]
pub struct PatternDecision {
    pub did_select_frame: bool,
    pub selected_frame: Option<FrameId>,
    pub transition_mode: Option<TransitionMode>,
    pub transition_speed: f32,
    pub glitch_add: f32,
    pub flash_add: f32,
}

impl PatternDecision {
    pub fn none() -> Self {
        Self {
            did_select_frame: false,
            selected_frame: None,
            transition_mode: None,
            transition_speed: 0.0,
            glitch_add: 0.0,
            flash_add: 0.0,
        }
    }
}

pub struct PatternSequencer {
    pattern: PatternId,
    cached_a: Option<FrameId>,
    cached_b: Option<FrameId>,
    cached_c: Option<FrameId>,
    bars_at_last_refresh: Option<u32>,
    sequence_pos: usize,
    last_side_left: bool,
    last_selected: Option<FrameId>,
    last_pose: Option<String>,
}

impl PatternSequencer {
    pub fn new(pattern: PatternId) -> Self {
        Self {
            pattern,
            cached_a: None,
            cached_b: None,
            cached_c: None,
            bars_at_last_refresh: None,
            sequence_pos: 0,
            last_side_left: true,
            last_selected: None,
            last_pose: None,
        }
    }

    pub fn pattern(&self) -> PatternId {
        self.pattern
    }

    pub fn set_pattern(&mut self, pattern: PatternId) {
        self.pattern = pattern;
        self.sequence_pos = 0;
        self.bars_at_last_refresh = None;
    }

    pub fn update(
        &mut self,
        pool: &FramePool,
        sample: &AudioSample,
        beat: &BeatUpdate,
        stutter_trigger: bool,
        rng: &mut StdRng,
    ) -> PatternDecision {
        if !beat.beat_detected {
            return PatternDecision::none();
        }

        let mut decision = PatternDecision::none();

        let pick = |pool: &FramePool,
                    candidates: Vec<FrameId>,
                    previous_pose: Option<&str>,
                    rng: &mut StdRng| {
            pick_uniform(pool, &candidates, previous_pose, MAX_POSE_RESAMPLES, rng)
        };

        match self.pattern {
            PatternId::PingPong => {
                let direction = if self.last_side_left { Direction::Right } else { Direction::Left };
                self.last_side_left = !self.last_side_left;
                let mut candidates: Vec<FrameId> = pool.by_direction(direction).to_vec();
                if candidates.is_empty() {
                    let all = pool.all_ids();
                    let mid = all.len() / 2;
                    candidates = if direction == Direction::Left {
                        all[..mid].to_vec()
                    } else {
                        all[mid..].to_vec()
                    };
                }
                decision.selected_frame = pick(pool, candidates, self.last_pose.as_deref(), rng);
                decision.transition_mode = Some(TransitionMode::Slide);
            }
            PatternId::Abab | PatternId::Aabb | PatternId::Abac => {
                self.maybe_refresh_cache(pool, beat, rng);
                let slot = self.fixed_sequence_slot();
                decision.selected_frame = slot;
                decision.transition_mode = Some(TransitionMode::Cut);
                self.sequence_pos += 1;
            }
            PatternId::Stutter | PatternId::SnareRoll => {
                if sample.mid > 0.6 || stutter_trigger {
                    decision.selected_frame = self.last_selected;
                    decision.did_select_frame = self.last_selected.is_some();
                    decision.transition_speed = 50.0;
                    decision.glitch_add = 0.3;
                    return self.finish(pool, decision);
                }
                let candidates = pool.by_energy(Energy::High).to_vec();
                decision.selected_frame = pick(pool, candidates, self.last_pose.as_deref(), rng);
            }
            PatternId::BuildDrop | PatternId::Impact => {
                let energy = if sample.bass > 0.7 { Energy::High } else { Energy::Low };
                let candidates = pool.by_energy(energy).to_vec();
                decision.selected_frame = pick(pool, candidates, self.last_pose.as_deref(), rng);
                if sample.bass > 0.7 {
                    decision.flash_add = 0.4;
                }
            }
            PatternId::Vogue => {
                let closeups = pool.by_type(FrameType::Closeup);
                let mut candidates: Vec<FrameId> = closeups
                    .iter()
                    .copied()
                    .filter(|id| pool.get(*id).map(|f| f.energy) == Some(Energy::High))
                    .collect();
                if candidates.is_empty() {
                    candidates = closeups.to_vec();
                }
                decision.selected_frame = pick(pool, candidates, self.last_pose.as_deref(), rng);
                decision.transition_mode = Some(TransitionMode::ZoomIn);
            }
            PatternId::Flow => {
                let candidates = pool.by_energy(Energy::Mid).to_vec();
                decision.selected_frame = pick(pool, candidates, self.last_pose.as_deref(), rng);
                decision.transition_mode = Some(TransitionMode::CrossFade);
                decision.transition_speed = 3.0;
            }
            PatternId::Chaos => {
                let candidates = pool.all_ids();
                decision.selected_frame = pick(pool, candidates, self.last_pose.as_deref(), rng);
                decision.glitch_add = rng.gen_range(0.0..0.5);
            }
            PatternId::Minimal => {
                let candidates = pool.by_energy(Energy::Low).to_vec();
                decision.selected_frame = pick(pool, candidates, self.last_pose.as_deref(), rng);
            }
            PatternId::Groove => {
                let direction = if beat.bar_counter % 2 == 0 { Direction::Left } else { Direction::Right };
                let candidates: Vec<FrameId> = pool
                    .by_energy(Energy::Mid)
                    .iter()
                    .copied()
                    .filter(|id| pool.get(*id).map(|f| f.direction) == Some(direction))
                    .collect();
                decision.selected_frame = pick(pool, candidates, self.last_pose.as_deref(), rng);
            }
            PatternId::Emote => {
                let candidates = pool.by_type(FrameType::Closeup).to_vec();
                decision.selected_frame = pick(pool, candidates, self.last_pose.as_deref(), rng);
                decision.transition_mode = Some(TransitionMode::ZoomIn);
            }
            PatternId::Footwork => {
                let feet = pool.by_type(FrameType::Feet);
                let candidates = if feet.is_empty() {
                    pool.by_energy(Energy::Mid).to_vec()
                } else {
                    feet.to_vec()
                };
                decision.selected_frame = pick(pool, candidates, self.last_pose.as_deref(), rng);
            }
        }

        self.finish(pool, decision)
    }

    fn finish(&mut self, pool: &FramePool, mut decision: PatternDecision) -> PatternDecision {
        if let Some(id) = decision.selected_frame {
            decision.did_select_frame = true;
            self.last_selected = Some(id);
            self.last_pose = pool.get(id).map(|f| f.pose.clone());
        }
        decision
    }

    fn maybe_refresh_cache(&mut self, pool: &FramePool, beat: &BeatUpdate, rng: &mut StdRng) {
        let needs_c = self.pattern == PatternId::Abac;
        let due = match self.bars_at_last_refresh {
            None => true,
            Some(last) => {
                let elapsed = beat.bar_counter.wrapping_sub(last);
                elapsed >= refresh_bars(self.pattern)
            }
        };
        if !due {
            return;
        }
        let all = pool.all_ids();
        self.cached_a = pick_uniform(pool, &all, None, 0, rng);
        self.cached_b = pick_uniform(pool, &all, None, 0, rng);
        self.cached_c = if needs_c { pick_uniform(pool, &all, None, 0, rng) } else { None };
        self.bars_at_last_refresh = Some(beat.bar_counter);
        self.sequence_pos = 0;
    }

    fn fixed_sequence_slot(&self) -> Option<FrameId> {
        let slots = match self.pattern {
            PatternId::Abab => vec![self.cached_a, self.cached_b, self.cached_a, self.cached_b],
            PatternId::Aabb => vec![self.cached_a, self.cached_a, self.cached_b, self.cached_b],
            PatternId::Abac => vec![self.cached_a, self.cached_b, self.cached_a, self.cached_c],
            _ => return None,
        };
        slots[self.sequence_pos % slots.len()]
    }

    pub fn reset(&mut self) {
        self.cached_a = None;
        self.cached_b = None;
        self.cached_c = None;
        self.bars_at_last_refresh = None;
        self.sequence_pos = 0;
        self.last_side_left = true;
        self.last_selected = None;
        self.last_pose = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_analysis::PhraseSection;
    use choreo_frames::{Category, Frame, Role};
    use rand::SeedableRng;

    fn frame(id: u32, direction: Direction) -> Frame {
        Frame {
            id: FrameId(id),
            image_handle: format!("f{id}"),
            energy: Energy::Mid,
            direction,
            frame_type: FrameType::Body,
            role: Role::Base,
            pose: format!("pose{id}"),
            derived_from: None,
            weight: 1.0,
            preferred_transitions: Vec::new(),
            best_phases: Vec::new(),
        }
    }

    fn beat(bar_counter: u32) -> BeatUpdate {
        BeatUpdate {
            bpm: 120.0,
            confidence: 1.0,
            beat_detected: true,
            beat_pos: 0.0,
            bar_counter,
            phrase_counter: 0,
            phrase_section: PhraseSection::Intro,
        }
    }

    #[test]
    fn ping_pong_alternates_direction_each_beat() {
        let mut pool = FramePool::new(Category::Character);
        pool.load(vec![frame(0, Direction::Left), frame(1, Direction::Right)]);
        let mut sequencer = PatternSequencer::new(PatternId::PingPong);
        let mut rng = StdRng::seed_from_u64(11);
        let sample = AudioSample { bass: 0.0, mid: 0.0, high: 0.0, energy: 0.0, timestamp_ms: 0 };

        let mut directions = Vec::new();
        for i in 0..8u32 {
            let decision = sequencer.update(&pool, &sample, &beat(i), false, &mut rng);
            let id = decision.selected_frame.unwrap();
            directions.push(pool.get(id).unwrap().direction);
        }
        assert_eq!(directions[0], Direction::Right);
        assert_eq!(directions[1], Direction::Left);
        assert_eq!(directions[2], Direction::Right);
    }

    #[test]
    fn abab_cycles_cached_a_and_b() {
        let mut pool = FramePool::new(Category::Character);
        pool.load(vec![frame(0, Direction::Left), frame(1, Direction::Right)]);
        let mut sequencer = PatternSequencer::new(PatternId::Abab);
        let mut rng = StdRng::seed_from_u64(4);
        let sample = AudioSample { bass: 0.0, mid: 0.0, high: 0.0, energy: 0.0, timestamp_ms: 0 };

        let first = sequencer.update(&pool, &sample, &beat(0), false, &mut rng).selected_frame;
        let second = sequencer.update(&pool, &sample, &beat(0), false, &mut rng).selected_frame;
        let third = sequencer.update(&pool, &sample, &beat(0), false, &mut rng).selected_frame;
        assert_eq!(first, third);
        assert_ne!(first, second);
    }

    #[test]
    fn stutter_freezes_current_frame_on_mid_energy() {
        let mut pool = FramePool::new(Category::Character);
        pool.load(vec![frame(0, Direction::Left)]);
        let mut sequencer = PatternSequencer::new(PatternId::Stutter);
        let mut rng = StdRng::seed_from_u64(2);
        let quiet = AudioSample { bass: 0.0, mid: 0.0, high: 0.9, energy: 0.0, timestamp_ms: 0 };
        let first = sequencer.update(&pool, &quiet, &beat(0), false, &mut rng);
        assert!(first.selected_frame.is_some());

        let loud_mid = AudioSample { bass: 0.0, mid: 0.9, high: 0.0, energy: 0.0, timestamp_ms: 0 };
        let second = sequencer.update(&pool, &loud_mid, &beat(0), false, &mut rng);
        assert_eq!(second.selected_frame, first.selected_frame);
        assert_eq!(second.transition_speed, 50.0);
        assert!((second.glitch_add - 0.3).abs() < 1e-6);
    }
}
