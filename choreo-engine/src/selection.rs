//! Shared uniform-random frame selection with duplicate-pose avoidance.

use choreo_frames::{FramePool, FrameId};
use rand::rngs::StdRng;
use rand::Rng;

/// Picks uniformly among `candidates`, re-sampling up to `max_resamples` times if a pick repeats
/// `previous_pose`. Falls back to `pool.all_ids()` when `candidates` is empty.
pub fn pick_uniform(
    pool: &FramePool,
    candidates: &[FrameId],
    previous_pose: Option<&str>,
    max_resamples: u32,
    rng: &mut StdRng,
) -> Option<FrameId> {
    let fallback;
    let ids = if candidates.is_empty() {
        fallback = pool.all_ids();
        fallback.as_slice()
    } else {
        candidates
    };
    if ids.is_empty() {
        return None;
    }

    let mut attempt = 0;
    loop {
        let id = ids[rng.gen_range(0..ids.len())];
        let is_duplicate = previous_pose
            .map(|pose| pool.get(id).map(|f| f.pose.as_str()) == Some(pose))
            .unwrap_or(false);
        if !is_duplicate || attempt >= max_resamples {
            return Some(id);
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_frames::{Category, Direction, Energy, Frame, FrameType, Role};
    use rand::SeedableRng;

    fn frame(id: u32, pose: &str) -> Frame {
        Frame {
            id: FrameId(id),
            image_handle: format!("f{id}"),
            energy: Energy::Mid,
            direction: Direction::Center,
            frame_type: FrameType::Body,
            role: Role::Base,
            pose: pose.to_string(),
            derived_from: None,
            weight: 1.0,
            preferred_transitions: Vec::new(),
            best_phases: Vec::new(),
        }
    }

    #[test]
    fn empty_candidates_fall_back_to_all_frames() {
        let mut pool = FramePool::new(Category::Symbol);
        pool.load(vec![frame(0, "a")]);
        let mut rng = StdRng::seed_from_u64(1);
        let picked = pick_uniform(&pool, &[], None, 1, &mut rng);
        assert_eq!(picked, Some(FrameId(0)));
    }

    #[test]
    fn single_candidate_is_always_picked_even_if_duplicate() {
        let mut pool = FramePool::new(Category::Symbol);
        pool.load(vec![frame(0, "same-pose")]);
        let mut rng = StdRng::seed_from_u64(1);
        let picked = pick_uniform(&pool, &[FrameId(0)], Some("same-pose"), 3, &mut rng);
        assert_eq!(picked, Some(FrameId(0)));
    }

    #[test]
    fn no_candidates_and_empty_pool_returns_none() {
        let pool = FramePool::new(Category::Symbol);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_uniform(&pool, &[], None, 1, &mut rng), None);
    }
}
