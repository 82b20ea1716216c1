//! Frame pool indexer: builds energy/direction/type indices, derives mirror/zoom variants,
//! and computes selection weights, transition affinities, and phase affinities.

use std::collections::HashMap;

use crate::frame::{Category, DerivedOp, Direction, Energy, Frame, FrameId, FrameType, Phase};

/// Ordered sequence of frames plus derived index views. Built once per loaded dance set and
/// immutable after the `load`/`derive`/`compute_*` pipeline has run; indices are views into the
/// sequence, rebuilt wholesale whenever the pool is mutated.
pub struct FramePool {
    category: Category,
    frames: Vec<Frame>,
    by_energy: HashMap<Energy, Vec<FrameId>>,
    by_direction: HashMap<Direction, Vec<FrameId>>,
    by_type: HashMap<FrameType, Vec<FrameId>>,
    next_id: u32,
}

impl FramePool {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            frames: Vec::new(),
            by_energy: HashMap::new(),
            by_direction: HashMap::new(),
            by_type: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.iter().find(|f| f.id == id)
    }

    fn get_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.iter_mut().find(|f| f.id == id)
    }

    pub fn all_ids(&self) -> Vec<FrameId> {
        self.frames.iter().map(|f| f.id).collect()
    }

    pub fn by_energy(&self, energy: Energy) -> &[FrameId] {
        self.by_energy.get(&energy).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_direction(&self, direction: Direction) -> &[FrameId] {
        self.by_direction.get(&direction).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_type(&self, frame_type: FrameType) -> &[FrameId] {
        self.by_type.get(&frame_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rebuilds the pool from a fresh frame list. Incoming frames are assigned sequential ids;
    /// the running id counter is preserved so a subsequent `derive()` never collides.
    pub fn load(&mut self, mut frames: Vec<Frame>) {
        for (i, frame) in frames.iter_mut().enumerate() {
            frame.id = FrameId(i as u32);
        }
        self.next_id = frames.len() as u32;
        self.frames = frames;
        self.rebuild_indices();
    }

    fn rebuild_indices(&mut self) {
        self.by_energy.clear();
        self.by_direction.clear();
        self.by_type.clear();

        for frame in &self.frames {
            self.by_energy.entry(frame.energy).or_default().push(frame.id);
            self.by_direction.entry(frame.direction).or_default().push(frame.id);
            self.by_type.entry(frame.frame_type).or_default().push(frame.id);
        }

        let all_ids: Vec<FrameId> = self.frames.iter().map(|f| f.id).collect();
        for energy in [Energy::Low, Energy::Mid, Energy::High] {
            let empty = self.by_energy.get(&energy).map_or(true, |v| v.is_empty());
            if empty {
                self.by_energy.insert(energy, all_ids.clone());
            }
        }
    }

    fn next_frame_id(&mut self) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        id
    }

    fn find_existing(&self, source: FrameId, op: &DerivedOp) -> Option<FrameId> {
        self.frames
            .iter()
            .find(|f| matches!(&f.derived_from, Some((s, o)) if *s == source && o == op))
            .map(|f| f.id)
    }

    fn derive_mirror(&mut self, source: &Frame) -> FrameId {
        let op = DerivedOp::Mirror;
        if let Some(existing) = self.find_existing(source.id, &op) {
            return existing;
        }
        let id = self.next_frame_id();
        self.frames.push(Frame {
            id,
            image_handle: source.image_handle.clone(),
            energy: source.energy,
            direction: source.direction.mirrored(),
            frame_type: source.frame_type,
            role: source.role,
            pose: source.pose.clone(),
            derived_from: Some((source.id, op)),
            weight: source.weight,
            preferred_transitions: Vec::new(),
            best_phases: Vec::new(),
        });
        id
    }

    fn derive_zoom(&mut self, source: &Frame, factor: f32) -> FrameId {
        let op = DerivedOp::Zoom { factor, offset_y: 0.0 };
        if let Some(existing) = self.find_existing(source.id, &op) {
            return existing;
        }
        let id = self.next_frame_id();
        let frame_type = if factor >= 1.5 { FrameType::Closeup } else { source.frame_type };
        self.frames.push(Frame {
            id,
            image_handle: source.image_handle.clone(),
            energy: source.energy,
            direction: source.direction,
            frame_type,
            role: source.role,
            pose: source.pose.clone(),
            derived_from: Some((source.id, op)),
            weight: source.weight,
            preferred_transitions: Vec::new(),
            best_phases: Vec::new(),
        });
        id
    }

    /// Synthesises mirror/zoom variants. Idempotent: calling twice on the same source frames
    /// produces no duplicate variants, since each derivation is keyed on `(source, op)`.
    pub fn derive(&mut self) {
        let sources: Vec<Frame> =
            self.frames.iter().filter(|f| !f.is_derived()).cloned().collect();

        for source in &sources {
            if source.frame_type != FrameType::Body {
                continue;
            }

            if self.category == Category::Character {
                self.derive_mirror(source);
            }

            let zoom_id = match source.energy {
                Energy::High => Some(self.derive_zoom(source, 1.6)),
                Energy::Mid => Some(self.derive_zoom(source, 1.25)),
                Energy::Low => None,
            };

            if let Some(zoom_id) = zoom_id {
                if self.category == Category::Character {
                    if let Some(zoom_frame) = self.get(zoom_id).cloned() {
                        self.derive_mirror(&zoom_frame);
                    }
                }
            }
        }

        self.rebuild_indices();
    }

    fn source_root(&self, id: FrameId) -> FrameId {
        let mut current = id;
        while let Some(frame) = self.get(current) {
            match frame.derived_from {
                Some((parent, _)) => current = parent,
                None => break,
            }
        }
        current
    }

    fn has_zoom_ancestor(&self, id: FrameId) -> bool {
        let mut current = Some(id);
        while let Some(cur_id) = current {
            match self.get(cur_id).and_then(|f| f.derived_from) {
                Some((_, DerivedOp::Zoom { .. })) => return true,
                Some((parent, _)) => current = Some(parent),
                None => current = None,
            }
        }
        false
    }

    /// Multiplicatively combines source (1.0) / mirror (×0.8) / zoom (×0.5) / closeup (×0.4)
    /// factors along each frame's derivation chain.
    pub fn compute_weights(&mut self) {
        let weights: Vec<(FrameId, f32)> =
            self.frames.iter().map(|f| (f.id, self.weight_for(f))).collect();
        for (id, weight) in weights {
            if let Some(frame) = self.get_mut(id) {
                frame.weight = weight;
            }
        }
    }

    fn weight_for(&self, frame: &Frame) -> f32 {
        let mut weight = 1.0f32;
        let mut current = frame.derived_from;
        while let Some((parent_id, op)) = current {
            match op {
                DerivedOp::Mirror => weight *= 0.8,
                DerivedOp::Zoom { .. } => weight *= 0.5,
                _ => {}
            }
            current = self.get(parent_id).and_then(|p| p.derived_from);
        }
        if frame.frame_type == FrameType::Closeup {
            weight *= 0.4;
        }
        weight
    }

    /// Populates `preferred_transitions`: up to 5 opposite-direction, 3 same-direction/
    /// different-source, and 3 energy-step-up candidates.
    pub fn compute_affinities(&mut self) {
        let ids = self.all_ids();
        let mut updates: Vec<(FrameId, Vec<FrameId>)> = Vec::with_capacity(ids.len());

        for id in ids {
            let frame = self.get(id).unwrap().clone();
            let mut transitions = Vec::new();

            if let Some(opposite) = frame.direction.opposite() {
                transitions.extend(
                    self.frames
                        .iter()
                        .filter(|f| f.id != frame.id && f.direction == opposite)
                        .take(5)
                        .map(|f| f.id),
                );
            }

            let own_root = self.source_root(frame.id);
            transitions.extend(
                self.frames
                    .iter()
                    .filter(|f| {
                        f.id != frame.id
                            && f.direction == frame.direction
                            && self.source_root(f.id) != own_root
                    })
                    .take(3)
                    .map(|f| f.id),
            );

            if let Some(step_up) = energy_step_up(frame.energy) {
                transitions.extend(
                    self.frames
                        .iter()
                        .filter(|f| f.id != frame.id && f.energy == step_up)
                        .take(3)
                        .map(|f| f.id),
                );
            }

            updates.push((frame.id, transitions));
        }

        for (id, transitions) in updates {
            if let Some(frame) = self.get_mut(id) {
                frame.preferred_transitions = transitions;
            }
        }
    }

    /// Populates `best_phases` per the energy/type/derivation rules in §4.C.
    pub fn compute_phase_affinities(&mut self) {
        let ids = self.all_ids();
        let mut updates: Vec<(FrameId, Vec<Phase>)> = Vec::with_capacity(ids.len());

        for id in ids {
            let frame = self.get(id).unwrap();
            let mut phases = Vec::new();
            match frame.energy {
                Energy::Low => {
                    push_phase(&mut phases, Phase::Ambient);
                    push_phase(&mut phases, Phase::Warmup);
                    push_phase(&mut phases, Phase::Flow);
                }
                Energy::Mid => {
                    push_phase(&mut phases, Phase::SwingLeft);
                    push_phase(&mut phases, Phase::SwingRight);
                    push_phase(&mut phases, Phase::Groove);
                }
                Energy::High => {
                    push_phase(&mut phases, Phase::Drop);
                    push_phase(&mut phases, Phase::Chaos);
                    push_phase(&mut phases, Phase::Groove);
                }
            }
            if frame.frame_type == FrameType::Closeup {
                push_phase(&mut phases, Phase::Vogue);
                push_phase(&mut phases, Phase::Flow);
            }
            if self.has_zoom_ancestor(id) {
                push_phase(&mut phases, Phase::Drop);
                push_phase(&mut phases, Phase::Chaos);
            }
            updates.push((id, phases));
        }

        for (id, phases) in updates {
            if let Some(frame) = self.get_mut(id) {
                frame.best_phases = phases;
            }
        }
    }
}

fn push_phase(phases: &mut Vec<Phase>, phase: Phase) {
    if !phases.contains(&phase) {
        phases.push(phase);
    }
}

fn energy_step_up(energy: Energy) -> Option<Energy> {
    match energy {
        Energy::Low => Some(Energy::Mid),
        Energy::Mid => Some(Energy::High),
        Energy::High => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Role;

    fn body_frame(id: u32, energy: Energy, direction: Direction) -> Frame {
        Frame {
            id: FrameId(id),
            image_handle: format!("frame-{id}.webp"),
            energy,
            direction,
            frame_type: FrameType::Body,
            role: Role::Base,
            pose: format!("pose-{id}"),
            derived_from: None,
            weight: 1.0,
            preferred_transitions: Vec::new(),
            best_phases: Vec::new(),
        }
    }

    #[test]
    fn empty_energy_bucket_backfills_with_all_frames() {
        let mut pool = FramePool::new(Category::Character);
        pool.load(vec![body_frame(0, Energy::Low, Direction::Left)]);
        assert_eq!(pool.by_energy(Energy::High).len(), 1);
    }

    #[test]
    fn mirror_flips_direction_and_is_idempotent() {
        let mut pool = FramePool::new(Category::Character);
        pool.load(vec![body_frame(0, Energy::Low, Direction::Right)]);
        pool.derive();
        let count_after_first = pool.len();
        pool.derive();
        assert_eq!(pool.len(), count_after_first, "deriving twice must not duplicate variants");

        let mirror = pool
            .frames()
            .iter()
            .find(|f| matches!(f.derived_from, Some((_, DerivedOp::Mirror))))
            .expect("mirror variant exists");
        assert_eq!(mirror.direction, Direction::Left);
    }

    #[test]
    fn high_energy_zoom_is_retyped_closeup() {
        let mut pool = FramePool::new(Category::Symbol);
        pool.load(vec![body_frame(0, Energy::High, Direction::Center)]);
        pool.derive();
        let zoom = pool
            .frames()
            .iter()
            .find(|f| matches!(f.derived_from, Some((_, DerivedOp::Zoom { factor, .. })) if factor >= 1.5))
            .expect("zoom variant exists");
        assert_eq!(zoom.frame_type, FrameType::Closeup);
    }

    #[test]
    fn weights_combine_multiplicatively() {
        let mut pool = FramePool::new(Category::Character);
        pool.load(vec![body_frame(0, Energy::High, Direction::Left)]);
        pool.derive();
        pool.compute_weights();

        let source = pool.get(FrameId(0)).unwrap();
        assert_eq!(source.weight, 1.0);

        let closeup_mirror = pool
            .frames()
            .iter()
            .find(|f| f.frame_type == FrameType::Closeup && matches!(f.derived_from, Some((_, DerivedOp::Mirror))))
            .expect("mirrored closeup exists");
        assert!((closeup_mirror.weight - (0.5 * 0.4 * 0.8)).abs() < 1e-6);
    }

    #[test]
    fn phase_affinities_follow_energy_and_type() {
        let mut pool = FramePool::new(Category::Symbol);
        pool.load(vec![body_frame(0, Energy::Low, Direction::Center)]);
        pool.derive();
        pool.compute_phase_affinities();
        let source = pool.get(FrameId(0)).unwrap();
        assert!(source.best_phases.contains(&Phase::Ambient));
        assert!(source.best_phases.contains(&Phase::Warmup));
        assert!(source.best_phases.contains(&Phase::Flow));
    }
}
