//! Offline whole-song analysis and per-beat choreography planning.

mod error;
mod planner;
mod song_map;

pub use error::PlanError;
pub use planner::{analyze_song, plan_song};
pub use song_map::{
    mood_for, BeatChoreography, Buildup, DropMarker, PlannedTransition, RepeatedPattern, Section,
    SectionMood, SectionType, SongMap,
};
