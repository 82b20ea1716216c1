//! Spectral feature extraction: band energies, multi-band onsets, spectral shape descriptors.

use std::collections::VecDeque;

const SPECTRUM_HISTORY: usize = 10;

/// A per-tick audio sample derived from the spectrum; the unit the rest of the engine consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSample {
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    pub energy: f32,
    pub timestamp_ms: u64,
}

/// Per-band onset energies (mean magnitude over the band's bin range) and detection flags.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandOnsets {
    pub kick: f32,
    pub snare: f32,
    pub hihat: f32,
    pub kick_detected: bool,
    pub snare_detected: bool,
    pub hihat_detected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpectralFeatures {
    pub centroid: f32,
    pub flux: f32,
    pub rolloff: f32,
    pub flatness: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureFrame {
    pub sample: AudioSample,
    pub onsets: BandOnsets,
    pub spectral: SpectralFeatures,
}

/// Per-band envelope follower with a slow moving-average floor, the same shape as a
/// multi-band kick detector's per-band onset state.
struct BandEnvelope {
    envelope: f32,
    moving_avg: f32,
}

impl BandEnvelope {
    fn new() -> Self {
        Self { envelope: 0.0, moving_avg: 0.0 }
    }

    fn update(&mut self, energy: f32) -> bool {
        const ATTACK: f32 = 0.6;
        const RELEASE: f32 = 0.15;
        const AVG_RATE: f32 = 0.05;

        if energy > self.envelope {
            self.envelope += (energy - self.envelope) * ATTACK;
        } else {
            self.envelope += (energy - self.envelope) * RELEASE;
        }
        self.moving_avg += (energy - self.moving_avg) * AVG_RATE;

        self.envelope > self.moving_avg * 1.5 && self.envelope > 0.05
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
        self.moving_avg = 0.0;
    }
}

/// Converts FFT magnitude spectra into the per-tick descriptors the rest of the engine consumes.
///
/// Pure per call given the previous-spectrum ring; returns a zeroed frame on an empty spectrum
/// rather than failing.
pub struct FeatureExtractor {
    sample_rate: f32,
    history: VecDeque<Vec<f32>>,
    kick_band: BandEnvelope,
    snare_band: BandEnvelope,
    hihat_band: BandEnvelope,
}

impl FeatureExtractor {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            history: VecDeque::with_capacity(SPECTRUM_HISTORY),
            kick_band: BandEnvelope::new(),
            snare_band: BandEnvelope::new(),
            hihat_band: BandEnvelope::new(),
        }
    }

    fn bin_for_freq(&self, n: usize, freq: f32) -> usize {
        let nyquist = self.sample_rate / 2.0;
        let bin_hz = nyquist / n as f32;
        ((freq / bin_hz).round() as usize).min(n.saturating_sub(1))
    }

    fn mean_range(spectrum: &[f32], lo: usize, hi: usize) -> f32 {
        let hi = hi.min(spectrum.len());
        if lo >= hi {
            return 0.0;
        }
        spectrum[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
    }

    /// Processes one spectrum frame into bands, onsets, and spectral shape descriptors.
    pub fn analyze(&mut self, spectrum: &[f32], timestamp_ms: u64) -> FeatureFrame {
        let n = spectrum.len();
        if n == 0 {
            return FeatureFrame {
                sample: AudioSample { bass: 0.0, mid: 0.0, high: 0.0, energy: 0.0, timestamp_ms },
                onsets: BandOnsets::default(),
                spectral: SpectralFeatures::default(),
            };
        }

        let bass = Self::mean_range(spectrum, 0, 5);
        let mid = Self::mean_range(spectrum, 5, 30);
        let high = Self::mean_range(spectrum, 30, 100);
        let energy = 0.5 * bass + 0.3 * mid + 0.2 * high;

        let kick_lo = self.bin_for_freq(n, 20.0);
        let kick_hi = self.bin_for_freq(n, 344.0);
        let snare_lo = self.bin_for_freq(n, 430.0);
        let snare_hi = self.bin_for_freq(n, 1290.0);
        let hihat_lo = self.bin_for_freq(n, 2600.0);
        let hihat_hi = self.bin_for_freq(n, 6900.0);

        let kick = Self::mean_range(spectrum, kick_lo, kick_hi + 1);
        let snare = Self::mean_range(spectrum, snare_lo, snare_hi + 1);
        let hihat = Self::mean_range(spectrum, hihat_lo, hihat_hi + 1);

        let onsets = BandOnsets {
            kick,
            snare,
            hihat,
            kick_detected: self.kick_band.update(kick),
            snare_detected: self.snare_band.update(snare),
            hihat_detected: self.hihat_band.update(hihat),
        };

        let spectral = self.spectral_features(spectrum);

        self.history.push_back(spectrum.to_vec());
        if self.history.len() > SPECTRUM_HISTORY {
            self.history.pop_front();
        }

        FeatureFrame {
            sample: AudioSample { bass, mid, high, energy, timestamp_ms },
            onsets,
            spectral,
        }
    }

    fn spectral_features(&self, spectrum: &[f32]) -> SpectralFeatures {
        let n = spectrum.len();
        let nyquist = self.sample_rate / 2.0;

        let mag_sum: f32 = spectrum.iter().sum();
        let centroid = if mag_sum > 0.0 {
            let weighted: f32 = spectrum.iter().enumerate().map(|(i, &m)| i as f32 * m).sum();
            let freq = (weighted / mag_sum) * (nyquist / n as f32);
            (freq / 10_000.0).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let flux = match self.history.back() {
            Some(prev) => {
                spectrum
                    .iter()
                    .zip(prev.iter())
                    .map(|(&cur, &prev)| (cur - prev).max(0.0))
                    .sum::<f32>()
                    / n as f32
            }
            None => 0.0,
        };

        let rolloff = if mag_sum > 0.0 {
            let target = mag_sum * 0.85;
            let mut cumulative = 0.0;
            let mut bin = n - 1;
            for (i, &m) in spectrum.iter().enumerate() {
                cumulative += m;
                if cumulative >= target {
                    bin = i;
                    break;
                }
            }
            bin as f32 / n as f32
        } else {
            0.0
        };

        let flatness = {
            let positive: Vec<f32> = spectrum.iter().copied().filter(|&m| m > 0.0).collect();
            if positive.is_empty() {
                0.0
            } else {
                let log_sum: f32 = positive.iter().map(|m| m.ln()).sum();
                let geometric_mean = (log_sum / positive.len() as f32).exp();
                let arithmetic_mean = positive.iter().sum::<f32>() / positive.len() as f32;
                if arithmetic_mean > 0.0 {
                    (geometric_mean / arithmetic_mean).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            }
        };

        SpectralFeatures { centroid, flux, rolloff, flatness }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.kick_band.reset();
        self.snare_band.reset();
        self.hihat_band.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_spectrum(n: usize, value: f32) -> Vec<f32> {
        vec![value; n]
    }

    #[test]
    fn empty_spectrum_returns_zeros() {
        let mut fx = FeatureExtractor::new(44100.0);
        let frame = fx.analyze(&[], 0);
        assert_eq!(frame.sample.bass, 0.0);
        assert_eq!(frame.sample.energy, 0.0);
    }

    #[test]
    fn silent_spectrum_has_zero_energy() {
        let mut fx = FeatureExtractor::new(44100.0);
        let spectrum = flat_spectrum(128, 0.0);
        let frame = fx.analyze(&spectrum, 0);
        assert_eq!(frame.sample.energy, 0.0);
        assert!(!frame.onsets.kick_detected);
    }

    #[test]
    fn bass_heavy_spectrum_dominates_energy() {
        let mut fx = FeatureExtractor::new(44100.0);
        let mut spectrum = flat_spectrum(128, 0.0);
        for bin in spectrum.iter_mut().take(5) {
            *bin = 1.0;
        }
        let frame = fx.analyze(&spectrum, 0);
        assert!(frame.sample.bass > frame.sample.mid);
        assert!(frame.sample.energy > 0.0);
    }

    #[test]
    fn flux_is_zero_on_identical_consecutive_spectra() {
        let mut fx = FeatureExtractor::new(44100.0);
        let spectrum = flat_spectrum(128, 0.3);
        fx.analyze(&spectrum, 0);
        let frame = fx.analyze(&spectrum, 10);
        assert_eq!(frame.spectral.flux, 0.0);
    }

    #[test]
    fn flat_spectrum_has_flatness_near_one() {
        let mut fx = FeatureExtractor::new(44100.0);
        let spectrum = flat_spectrum(128, 0.5);
        let frame = fx.analyze(&spectrum, 0);
        assert!(frame.spectral.flatness > 0.99);
    }
}
