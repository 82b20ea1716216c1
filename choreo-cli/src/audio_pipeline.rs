//! Bridges raw PCM into the analysis crate's spectrum-domain `FeatureExtractor`: windows mono
//! samples into fixed-size FFT frames, same shape as `ole-analysis::spectrum::SpectrumAnalyzer`.

use std::collections::VecDeque;
use std::sync::Arc;

use choreo_analysis::{FeatureExtractor, FeatureFrame};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

const FFT_SIZE: usize = 1024;
const HOP_SIZE: usize = 512;

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        .collect()
}

/// Accumulates incoming mono samples and emits one `FeatureFrame` per hop once enough samples
/// have arrived, at `sample_rate_ms_per_sample` granularity.
pub struct SpectrumPipeline {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: VecDeque<f32>,
    extractor: FeatureExtractor,
    sample_rate: u32,
    samples_consumed: u64,
}

impl SpectrumPipeline {
    pub fn new(sample_rate: u32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            fft: planner.plan_fft_forward(FFT_SIZE),
            window: hann_window(FFT_SIZE),
            buffer: VecDeque::with_capacity(FFT_SIZE * 2),
            extractor: FeatureExtractor::new(sample_rate as f32),
            sample_rate,
            samples_consumed: 0,
        }
    }

    /// Pushes mono samples and returns every full analysis frame that became available.
    pub fn push(&mut self, samples: &[f32]) -> Vec<FeatureFrame> {
        self.buffer.extend(samples.iter().copied());
        let mut frames = Vec::new();

        while self.buffer.len() >= FFT_SIZE {
            let mut complex: Vec<Complex32> = self
                .buffer
                .iter()
                .take(FFT_SIZE)
                .zip(&self.window)
                .map(|(s, w)| Complex32::new(s * w, 0.0))
                .collect();
            self.fft.process(&mut complex);
            let spectrum: Vec<f32> = complex[..FFT_SIZE / 2].iter().map(|c| c.norm()).collect();

            let timestamp_ms = (self.samples_consumed * 1000) / self.sample_rate.max(1) as u64;
            frames.push(self.extractor.analyze(&spectrum, timestamp_ms));

            for _ in 0..HOP_SIZE.min(self.buffer.len()) {
                self.buffer.pop_front();
            }
            self.samples_consumed += HOP_SIZE as u64;
        }

        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_produces_zero_energy_frames() {
        let mut pipeline = SpectrumPipeline::new(44100);
        let silence = vec![0.0f32; FFT_SIZE * 3];
        let frames = pipeline.push(&silence);
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|f| f.sample.energy == 0.0));
    }

    #[test]
    fn partial_chunk_produces_no_frame_until_window_fills() {
        let mut pipeline = SpectrumPipeline::new(44100);
        let short = vec![0.1f32; FFT_SIZE / 2];
        assert!(pipeline.push(&short).is_empty());
    }
}
