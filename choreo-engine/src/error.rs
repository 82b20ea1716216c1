use thiserror::Error;

/// Errors surfaced by non-realtime engine operations: deck configuration, command dispatch,
/// frame-set loading. The real-time `Engine::update` tick never returns `Result` — a frame must
/// always be produced, even a degenerate one.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("deck index {0} is out of range (decks are numbered 0-3)")]
    InvalidDeckIndex(usize),

    #[error("invalid value {value} for parameter `{name}`")]
    InvalidParameter { name: &'static str, value: f32 },

    #[error("frame pool is empty, no candidates and no fallback frames available")]
    EmptyPool,

    #[error("frame-set package error: {0}")]
    Package(#[from] choreo_frames::PackageError),

    #[error("unknown pattern id `{0}`")]
    UnknownPattern(String),
}
