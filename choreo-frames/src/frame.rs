//! Frame data model: the unit the mixer and sequencer select between.

use serde::{Deserialize, Serialize};

/// Arena index into a [`crate::pool::FramePool`]. Frames never hold owning references to each
/// other; affinities and derivation links are id lists resolved back through the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub u32);

/// Target subject category declared by a frame-set package's `meta.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Character,
    Text,
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Energy {
    Low,
    Mid,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Center,
    Right,
}

impl Direction {
    pub fn mirrored(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Center => Direction::Center,
        }
    }

    pub fn opposite(self) -> Option<Direction> {
        match self {
            Direction::Left => Some(Direction::Right),
            Direction::Right => Some(Direction::Left),
            Direction::Center => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    Body,
    Closeup,
    Hands,
    Feet,
    Mandala,
    Acrobatic,
}

impl FrameType {
    /// Unknown manifest tags map to `Body` (the canonical 6-element set, per the open question
    /// on `FrameType` enumeration variance across source modules).
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "closeup" => FrameType::Closeup,
            "hands" => FrameType::Hands,
            "feet" => FrameType::Feet,
            "mandala" => FrameType::Mandala,
            "acrobatic" => FrameType::Acrobatic,
            _ => FrameType::Body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Base,
    Alt,
    Flourish,
    Smooth,
}

impl Role {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "alt" => Role::Alt,
            "flourish" => Role::Flourish,
            "smooth" => Role::Smooth,
            _ => Role::Base,
        }
    }
}

/// A pool/phase bucket a frame is well-suited for, per `compute_phase_affinities`. Shared with
/// `choreo-planner`'s per-beat phase pooling (§4.H uses a subset of these names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Ambient,
    Warmup,
    Flow,
    SwingLeft,
    SwingRight,
    Groove,
    Drop,
    Chaos,
    Vogue,
}

/// Recognised derivation operation kinds. Only `Mirror` and `Zoom` are actively produced by
/// [`crate::pool::FramePool::derive`]; the rest are declared for manifests that carry them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DerivedOp {
    Mirror,
    Zoom { factor: f32, offset_y: f32 },
    Crop,
    Rotate,
    Stutter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    pub image_handle: String,
    pub energy: Energy,
    pub direction: Direction,
    pub frame_type: FrameType,
    pub role: Role,
    pub pose: String,
    pub derived_from: Option<(FrameId, DerivedOp)>,
    pub weight: f32,
    pub preferred_transitions: Vec<FrameId>,
    pub best_phases: Vec<Phase>,
}

impl Frame {
    pub fn is_derived(&self) -> bool {
        self.derived_from.is_some()
    }
}
