use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("song analysis was cancelled")]
    AnalysisAborted,

    #[error("audio buffer is too short to analyze: {samples} samples at {sample_rate} Hz")]
    BufferTooShort { samples: usize, sample_rate: u32 },

    #[error("frame pool has no frames to plan against")]
    EmptyPool,
}
