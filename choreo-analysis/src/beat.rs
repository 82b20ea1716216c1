//! Adaptive-threshold beat detection, BPM estimation, and bar/phrase counters.

use std::collections::VecDeque;

const BASS_HISTORY_CAP: usize = 60;
const BEAT_TIMES_CAP: usize = 16;
const MIN_BEAT_INTERVAL_MS: u64 = 250;
const MAX_BEAT_INTERVAL_MS: u64 = 1500;
const PEAK_DECAY_PER_MS: f32 = 0.0006;

/// One quarter of a 32-beat phrase cycle, independent of the bar counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseSection {
    Intro,
    VerseA,
    VerseB,
    Chorus,
    Drop,
}

impl PhraseSection {
    pub fn at_beat(beat_counter: u64) -> Self {
        match beat_counter % 32 {
            0..=7 => PhraseSection::Intro,
            8..=15 => PhraseSection::VerseA,
            16..=23 => PhraseSection::VerseB,
            24..=27 => PhraseSection::Chorus,
            _ => PhraseSection::Drop,
        }
    }
}

/// Snapshot produced after each tick or tap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatUpdate {
    pub bpm: f32,
    pub confidence: f32,
    pub beat_detected: bool,
    pub beat_pos: f32,
    pub bar_counter: u32,
    pub phrase_counter: u32,
    pub phrase_section: PhraseSection,
}

/// Tracks bass-energy history, detected-beat timestamps, BPM, and bar/phrase position.
pub struct BeatTracker {
    bass_history: VecDeque<f32>,
    beat_times: VecDeque<u64>,
    last_beat_time: Option<u64>,
    last_tick_time: Option<u64>,
    peak_hold: f32,
    bpm: f32,
    confidence: f32,
    beat_counter: u64,
}

impl BeatTracker {
    pub fn new() -> Self {
        Self {
            bass_history: VecDeque::with_capacity(BASS_HISTORY_CAP),
            beat_times: VecDeque::with_capacity(BEAT_TIMES_CAP),
            last_beat_time: None,
            last_tick_time: None,
            peak_hold: 0.0,
            bpm: 120.0,
            confidence: 0.0,
            beat_counter: 0,
        }
    }

    fn adaptive_threshold(&self) -> f32 {
        if self.bass_history.is_empty() {
            return f32::INFINITY;
        }
        let mean = self.bass_history.iter().sum::<f32>() / self.bass_history.len() as f32;
        (mean * 1.3)
            .max(mean + (self.peak_hold - mean) * 0.35)
            .max(self.peak_hold * 0.4)
    }

    fn within_beat_interval(&self, now_ms: u64) -> bool {
        match self.last_beat_time {
            Some(last) => {
                let elapsed = now_ms.saturating_sub(last);
                elapsed >= MIN_BEAT_INTERVAL_MS && elapsed <= MAX_BEAT_INTERVAL_MS
            }
            None => true,
        }
    }

    fn register_beat(&mut self, now_ms: u64) {
        self.beat_times.push_back(now_ms);
        if self.beat_times.len() > BEAT_TIMES_CAP {
            self.beat_times.pop_front();
        }
        self.last_beat_time = Some(now_ms);
        self.beat_counter += 1;
        self.recompute_bpm();
    }

    fn recompute_bpm(&mut self) {
        if self.beat_times.len() < 2 {
            self.bpm = 120.0;
            self.confidence = 0.0;
            return;
        }
        let mut intervals: Vec<f32> = self
            .beat_times
            .iter()
            .zip(self.beat_times.iter().skip(1))
            .map(|(a, b)| (b - a) as f32)
            .collect();
        intervals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = intervals[intervals.len() / 2];
        self.bpm = (60_000.0 / median).clamp(60.0, 200.0);

        let mean = intervals.iter().sum::<f32>() / intervals.len() as f32;
        let variance =
            intervals.iter().map(|i| (i - mean).powi(2)).sum::<f32>() / intervals.len() as f32;
        let std_dev = variance.sqrt();
        self.confidence = if mean > 0.0 { (1.0 - 2.0 * std_dev / mean).max(0.0) } else { 0.0 };
    }

    /// Processes one tick of bass energy and returns the updated tracker state.
    pub fn update(&mut self, bass: f32, now_ms: u64) -> BeatUpdate {
        let elapsed_ms =
            self.last_tick_time.map(|last| now_ms.saturating_sub(last)).unwrap_or(0);
        self.last_tick_time = Some(now_ms);

        self.peak_hold =
            (self.peak_hold - PEAK_DECAY_PER_MS * elapsed_ms as f32).max(bass).max(0.0);

        self.bass_history.push_back(bass);
        if self.bass_history.len() > BASS_HISTORY_CAP {
            self.bass_history.pop_front();
        }

        let beat_detected = bass > self.adaptive_threshold() && self.within_beat_interval(now_ms);
        if beat_detected {
            self.register_beat(now_ms);
        }

        self.snapshot(now_ms, beat_detected)
    }

    /// Manual tap-beat interface; applies the same min/max interval guard as detected beats.
    pub fn tap_beat(&mut self, now_ms: u64) -> BeatUpdate {
        let allowed = self.within_beat_interval(now_ms);
        if allowed {
            self.register_beat(now_ms);
        }
        self.snapshot(now_ms, allowed)
    }

    fn snapshot(&self, now_ms: u64, beat_detected: bool) -> BeatUpdate {
        let beat_duration_ms = 60_000.0 / self.bpm;
        let beat_pos = if beat_duration_ms > 0.0 {
            (now_ms as f32 % beat_duration_ms) / beat_duration_ms
        } else {
            0.0
        };
        BeatUpdate {
            bpm: self.bpm,
            confidence: self.confidence,
            beat_detected,
            beat_pos,
            bar_counter: (self.beat_counter % 16) as u32,
            phrase_counter: (self.beat_counter % 8) as u32,
            phrase_section: PhraseSection::at_beat(self.beat_counter),
        }
    }

    /// Snapshot of the tracker's current state without consuming a new tick, for pull-based
    /// telemetry. `beat_detected` is always `false` since no new sample was processed.
    pub fn current_snapshot(&self) -> BeatUpdate {
        self.snapshot(self.last_tick_time.unwrap_or(0), false)
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn beat_counter(&self) -> u64 {
        self.beat_counter
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for BeatTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_bpm_before_two_beats() {
        let tracker = BeatTracker::new();
        assert_eq!(tracker.bpm(), 120.0);
        assert_eq!(tracker.confidence(), 0.0);
    }

    #[test]
    fn silent_stream_detects_no_beats() {
        let mut tracker = BeatTracker::new();
        let mut any_beat = false;
        for tick in 0..600u64 {
            let update = tracker.update(0.0, tick * 16);
            any_beat |= update.beat_detected;
        }
        assert!(!any_beat);
        assert_eq!(tracker.bpm(), 120.0);
    }

    #[test]
    fn metronome_at_120_bpm_converges() {
        let mut tracker = BeatTracker::new();
        let mut now: u64 = 0;
        for beat_index in 0..16u64 {
            let impulse_time = beat_index * 500;
            while now < impulse_time {
                tracker.update(0.0, now);
                now += 16;
            }
            tracker.update(0.9, impulse_time);
            now = impulse_time + 16;
        }
        assert!((tracker.bpm() - 120.0).abs() <= 1.0);
        assert!(tracker.confidence() > 0.9);
        assert!(tracker.beat_counter() >= 8);
    }

    #[test]
    fn minimum_interval_rejects_double_trigger() {
        let mut tracker = BeatTracker::new();
        let first = tracker.update(0.9, 0);
        assert!(first.beat_detected);
        let bounce = tracker.update(0.9, 50);
        assert!(!bounce.beat_detected);
    }

    #[test]
    fn phrase_section_cycles_every_32_beats() {
        assert_eq!(PhraseSection::at_beat(0), PhraseSection::Intro);
        assert_eq!(PhraseSection::at_beat(10), PhraseSection::VerseA);
        assert_eq!(PhraseSection::at_beat(20), PhraseSection::VerseB);
        assert_eq!(PhraseSection::at_beat(25), PhraseSection::Chorus);
        assert_eq!(PhraseSection::at_beat(30), PhraseSection::Drop);
        assert_eq!(PhraseSection::at_beat(32), PhraseSection::Intro);
    }
}
