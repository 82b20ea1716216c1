//! Whole-song analysis output: the typed document produced by [`crate::planner::analyze_song`]
//! and consumed at playback time by `choreo-engine`'s file-mode orchestrator.

use choreo_frames::{FrameId, Phase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionType {
    Intro,
    Verse,
    Prechorus,
    Chorus,
    Bridge,
    Breakdown,
    Drop,
    Outro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionMood {
    Ambient,
    Groove,
    Hype,
    Peak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlannedTransition {
    Cut,
    ZoomIn,
    Slide,
    Smooth,
    Morph,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub section_type: SectionType,
    pub start_ms: u64,
    pub end_ms: u64,
    pub energy: f32,
    pub is_repeat: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatedPattern {
    pub id: u32,
    /// Start timestamps (ms) of every occurrence of the 4-beat window this pattern fingerprints.
    pub occurrences: Vec<u64>,
    pub duration_ms: u64,
    pub energy: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DropMarker {
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Buildup {
    pub start_ms: u64,
    pub drop_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatChoreography {
    pub beat_index: u32,
    pub timestamp_ms: u64,
    pub frame_id: Option<FrameId>,
    pub transition_mode: PlannedTransition,
    pub transition_speed: f32,
    pub target_rotation: [f32; 3],
    pub target_squash: f32,
    pub target_bounce: f32,
    pub fx_mode: String,
    pub rgb_split: f32,
    pub flash: f32,
    pub phase: Phase,
    pub section_type: SectionType,
    pub mood: SectionMood,
    pub is_signature_move: bool,
    pub pattern_id: Option<u32>,
    pub expected_energy: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongMap {
    pub duration_ms: u64,
    pub bpm: f32,
    pub time_signature: (u8, u8),
    pub beats: Vec<u64>,
    pub downbeats: Vec<u64>,
    pub sections: Vec<Section>,
    pub repeated_patterns: Vec<RepeatedPattern>,
    /// Composite energy, 50ms resolution.
    pub energy_profile: Vec<f32>,
    pub drops: Vec<DropMarker>,
    pub buildups: Vec<Buildup>,
    pub choreography: Vec<BeatChoreography>,
}

impl SongMap {
    /// Binary-searches `choreography` for the entry whose `timestamp_ms` is the latest one at
    /// or before `time_ms`. Returns `None` before the first beat.
    pub fn choreography_at(&self, time_ms: u64) -> Option<&BeatChoreography> {
        match self.choreography.binary_search_by_key(&time_ms, |c| c.timestamp_ms) {
            Ok(i) => Some(&self.choreography[i]),
            Err(0) => None,
            Err(i) => Some(&self.choreography[i - 1]),
        }
    }

    pub fn energy_at(&self, time_ms: u64) -> f32 {
        let index = (time_ms / 50) as usize;
        self.energy_profile.get(index).copied().unwrap_or(0.0)
    }

    pub fn section_at(&self, time_ms: u64) -> Option<&Section> {
        self.sections.iter().find(|s| time_ms >= s.start_ms && time_ms < s.end_ms)
    }
}

pub fn mood_for(section_type: SectionType, energy: f32) -> SectionMood {
    match section_type {
        SectionType::Drop => SectionMood::Peak,
        SectionType::Chorus => SectionMood::Hype,
        SectionType::Breakdown | SectionType::Intro | SectionType::Outro => SectionMood::Ambient,
        _ if energy > 0.65 => SectionMood::Hype,
        _ => SectionMood::Groove,
    }
}
