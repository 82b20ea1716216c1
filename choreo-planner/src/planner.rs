//! Whole-song analysis pipeline: onset envelope -> BPM -> beat grid -> energy profile ->
//! sections -> repeated patterns -> drops/buildups -> per-beat choreography plan.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use choreo_frames::{FramePool, Phase};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::{num_complex::Complex32, FftPlanner};
use tracing::debug;

use crate::error::PlanError;
use crate::song_map::{
    mood_for, BeatChoreography, DropMarker, PlannedTransition, RepeatedPattern, Section,
    SectionType, SongMap,
};

const WINDOW_SIZE: usize = 1024;
const HOP_SIZE: usize = 512;
const ENERGY_RESOLUTION_MS: u64 = 50;

struct OnsetSample {
    timestamp_ms: u64,
    bass: f32,
    mid: f32,
    high: f32,
    flux: f32,
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        .collect()
}

fn bin_for_freq(freq_hz: f32, sample_rate: u32, window: usize) -> usize {
    let nyquist = sample_rate as f32 / 2.0;
    let bin = (freq_hz / nyquist) * (window as f32 / 2.0);
    (bin as usize).min(window / 2 - 1)
}

fn mean_range(spectrum: &[f32], lo: usize, hi: usize) -> f32 {
    let hi = hi.min(spectrum.len());
    if hi <= lo {
        return 0.0;
    }
    spectrum[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
}

/// Runs the full offline pipeline described for the choreography planner. `cancel` is polled
/// between analysis windows so a caller can abort a long-running analysis.
pub fn analyze_song(
    samples: &[f32],
    sample_rate: u32,
    cancel: &Arc<AtomicBool>,
) -> Result<SongMap, PlanError> {
    if samples.len() < WINDOW_SIZE {
        return Err(PlanError::BufferTooShort { samples: samples.len(), sample_rate });
    }

    let duration_ms = (samples.len() as u64 * 1000) / sample_rate as u64;
    let onsets = compute_onset_envelope(samples, sample_rate, cancel)?;

    let bpm = estimate_bpm(&onsets);
    let (beats, downbeats) = quantize_beat_grid(bpm, duration_ms, &onsets);
    let energy_profile = compute_energy_profile(&onsets, duration_ms);
    let smoothed = smooth(&energy_profile, 20);
    let sections = detect_sections(&smoothed, &beats, duration_ms);
    let repeated_patterns = detect_repeated_patterns(&smoothed, &beats);
    let (drops, buildups) = detect_drops(&smoothed);

    debug!(bpm, beats = beats.len(), sections = sections.len(), "song analysis complete");

    Ok(SongMap {
        duration_ms,
        bpm,
        time_signature: (4, 4),
        beats,
        downbeats,
        sections,
        repeated_patterns,
        energy_profile,
        drops,
        buildups,
        choreography: Vec::new(),
    })
}

fn compute_onset_envelope(
    samples: &[f32],
    sample_rate: u32,
    cancel: &Arc<AtomicBool>,
) -> Result<Vec<OnsetSample>, PlanError> {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(WINDOW_SIZE);
    let window = hann_window(WINDOW_SIZE);

    let bass_hi = bin_for_freq(250.0, sample_rate, WINDOW_SIZE);
    let mid_hi = bin_for_freq(2000.0, sample_rate, WINDOW_SIZE);
    let high_hi = WINDOW_SIZE / 2;

    let mut onsets = Vec::new();
    let mut prev_spectrum: Option<Vec<f32>> = None;
    let mut offset = 0usize;

    while offset + WINDOW_SIZE <= samples.len() {
        if cancel.load(Ordering::Relaxed) {
            return Err(PlanError::AnalysisAborted);
        }

        let mut buffer: Vec<Complex32> = samples[offset..offset + WINDOW_SIZE]
            .iter()
            .zip(&window)
            .map(|(s, w)| Complex32::new(s * w, 0.0))
            .collect();
        fft.process(&mut buffer);
        let spectrum: Vec<f32> = buffer[..WINDOW_SIZE / 2].iter().map(|c| c.norm()).collect();

        let (bass, mid, high, flux) = if let Some(prev) = &prev_spectrum {
            let band_flux = |lo: usize, hi: usize| -> f32 {
                spectrum[lo..hi.min(spectrum.len())]
                    .iter()
                    .zip(&prev[lo..hi.min(prev.len())])
                    .map(|(a, b)| (a - b).max(0.0))
                    .sum()
            };
            let bass_flux = band_flux(0, bass_hi);
            let mid_flux = band_flux(bass_hi, mid_hi);
            let high_flux = band_flux(mid_hi, high_hi);
            (bass_flux, mid_flux, high_flux, bass_flux + mid_flux + high_flux)
        } else {
            (0.0, 0.0, 0.0, 0.0)
        };

        let timestamp_ms = (offset as u64 * 1000) / sample_rate as u64;
        onsets.push(OnsetSample {
            timestamp_ms,
            bass: mean_range(&spectrum, 0, bass_hi),
            mid: mean_range(&spectrum, bass_hi, mid_hi),
            high: mean_range(&spectrum, mid_hi, high_hi),
            flux,
        });

        prev_spectrum = Some(spectrum);
        offset += HOP_SIZE;
    }

    Ok(onsets)
}

/// 20ms-binned histogram of inter-onset intervals among onsets whose flux exceeds 0.3, doubled
/// or halved into `[60, 180]`.
fn estimate_bpm(onsets: &[OnsetSample]) -> f32 {
    let strong: Vec<u64> = onsets.iter().filter(|o| o.flux > 0.3).map(|o| o.timestamp_ms).collect();
    if strong.len() < 2 {
        return 120.0;
    }

    let mut histogram = std::collections::HashMap::new();
    for pair in strong.windows(2) {
        let interval = pair[1].saturating_sub(pair[0]);
        if (200..=2000).contains(&interval) {
            let bin = interval / 20;
            *histogram.entry(bin).or_insert(0u32) += 1;
        }
    }

    let Some((&bin, _)) = histogram.iter().max_by_key(|(_, count)| **count) else {
        return 120.0;
    };
    let interval_ms = (bin * 20 + 10).max(1) as f32;
    let mut bpm = 60_000.0 / interval_ms;
    while bpm < 60.0 {
        bpm *= 2.0;
    }
    while bpm > 180.0 {
        bpm /= 2.0;
    }
    bpm
}

fn quantize_beat_grid(bpm: f32, duration_ms: u64, onsets: &[OnsetSample]) -> (Vec<u64>, Vec<u64>) {
    let beat_duration_ms = (60_000.0 / bpm.max(1.0)) as u64;
    let anchor = onsets.iter().find(|o| o.flux > 0.3).map(|o| o.timestamp_ms).unwrap_or(0);

    let mut beats = Vec::new();
    let mut t = anchor;
    while t < duration_ms {
        beats.push(t);
        t += beat_duration_ms.max(1);
    }

    let downbeats = beats.iter().step_by(4).copied().collect();
    (beats, downbeats)
}

fn compute_energy_profile(onsets: &[OnsetSample], duration_ms: u64) -> Vec<f32> {
    let bucket_count = (duration_ms / ENERGY_RESOLUTION_MS).max(1) as usize;
    let mut buckets = vec![(0.0f32, 0.0f32, 0.0f32, 0u32); bucket_count];

    for onset in onsets {
        let idx = (onset.timestamp_ms / ENERGY_RESOLUTION_MS) as usize;
        if let Some(bucket) = buckets.get_mut(idx) {
            bucket.0 += onset.bass;
            bucket.1 += onset.mid;
            bucket.2 += onset.high;
            bucket.3 += 1;
        }
    }

    let mut raw: Vec<(f32, f32, f32)> = buckets
        .iter()
        .map(|(b, m, h, n)| {
            if *n == 0 {
                (0.0, 0.0, 0.0)
            } else {
                (b / *n as f32, m / *n as f32, h / *n as f32)
            }
        })
        .collect();

    let max_bass = raw.iter().map(|r| r.0).fold(0.0f32, f32::max).max(1e-6);
    let max_mid = raw.iter().map(|r| r.1).fold(0.0f32, f32::max).max(1e-6);
    let max_high = raw.iter().map(|r| r.2).fold(0.0f32, f32::max).max(1e-6);

    raw.iter_mut().for_each(|r| {
        r.0 /= max_bass;
        r.1 /= max_mid;
        r.2 /= max_high;
    });

    raw.into_iter().map(|(b, m, h)| 0.5 * b + 0.3 * m + 0.2 * h).collect()
}

fn smooth(series: &[f32], window: usize) -> Vec<f32> {
    if series.is_empty() {
        return Vec::new();
    }
    let half = window / 2;
    (0..series.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(series.len());
            series[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
        })
        .collect()
}

fn detect_sections(smoothed: &[f32], beats: &[u64], duration_ms: u64) -> Vec<Section> {
    if smoothed.is_empty() {
        return Vec::new();
    }

    let min_gap_samples = {
        let avg_beat_ms = if beats.len() > 1 {
            (beats[1] - beats[0]).max(1)
        } else {
            500
        };
        (8 * avg_beat_ms / ENERGY_RESOLUTION_MS).max(1) as usize
    };

    let mut boundaries = vec![0usize];
    let mut last_boundary = 0usize;
    for i in 20..smoothed.len().saturating_sub(20) {
        if i < last_boundary + min_gap_samples {
            continue;
        }
        let pre: f32 = smoothed[i - 20..i].iter().sum::<f32>() / 20.0;
        let post: f32 = smoothed[i..i + 20].iter().sum::<f32>() / 20.0;
        if (post - pre).abs() > 0.15 {
            boundaries.push(i);
            last_boundary = i;
        }
    }
    boundaries.push(smoothed.len());

    let mut sections = Vec::new();
    let mut seen: Vec<(SectionType, f32)> = Vec::new();

    for window in boundaries.windows(2) {
        let (start_idx, end_idx) = (window[0], window[1]);
        if end_idx <= start_idx {
            continue;
        }
        let energy = smoothed[start_idx..end_idx].iter().sum::<f32>()
            / (end_idx - start_idx) as f32;
        let start_ms = start_idx as u64 * ENERGY_RESOLUTION_MS;
        let end_ms = end_idx as u64 * ENERGY_RESOLUTION_MS;
        let relative_pos = start_ms as f32 / duration_ms.max(1) as f32;

        let section_type = if relative_pos < 0.08 {
            SectionType::Intro
        } else if end_ms as f32 / duration_ms.max(1) as f32 > 0.92 {
            SectionType::Outro
        } else if energy > 0.8 {
            SectionType::Drop
        } else if energy > 0.65 {
            SectionType::Chorus
        } else if energy < 0.25 {
            SectionType::Breakdown
        } else if energy < 0.4 {
            SectionType::Verse
        } else {
            SectionType::Verse
        };

        let is_repeat = seen
            .iter()
            .any(|(t, e)| *t == section_type && (*e - energy).abs() < 0.1);
        seen.push((section_type, energy));

        sections.push(Section { section_type, start_ms, end_ms, energy, is_repeat });
    }

    sections
}

fn detect_repeated_patterns(smoothed: &[f32], beats: &[u64]) -> Vec<RepeatedPattern> {
    if beats.len() < 5 {
        return Vec::new();
    }

    let sample_at = |ms: u64| -> f32 {
        let idx = (ms / ENERGY_RESOLUTION_MS) as usize;
        smoothed.get(idx).copied().unwrap_or(0.0)
    };

    let fingerprint = |start_beat: usize| -> Option<[i32; 4]> {
        let window = beats.get(start_beat..start_beat + 4)?;
        Some([
            (sample_at(window[0]) * 9.0) as i32,
            (sample_at(window[1]) * 9.0) as i32,
            (sample_at(window[2]) * 9.0) as i32,
            (sample_at(window[3]) * 9.0) as i32,
        ])
    };

    let windows: usize = beats.len().saturating_sub(4);
    let mut assigned = vec![false; windows];
    let mut patterns = Vec::new();
    let mut next_id = 0u32;

    for i in 0..windows {
        if assigned[i] {
            continue;
        }
        let Some(fp_i) = fingerprint(i) else { continue };
        let mut occurrences = vec![beats[i]];

        for j in (i + 1)..windows {
            if assigned[j] {
                continue;
            }
            let Some(fp_j) = fingerprint(j) else { continue };
            let matches = fp_i.iter().zip(&fp_j).filter(|(a, b)| a == b).count();
            if matches as f32 / 4.0 >= 0.8 {
                occurrences.push(beats[j]);
                assigned[j] = true;
            }
        }

        if occurrences.len() >= 2 {
            assigned[i] = true;
            let duration_ms = beats.get(i + 4).map(|t| t - beats[i]).unwrap_or(0);
            let energy = sample_at(beats[i]);
            patterns.push(RepeatedPattern { id: next_id, occurrences, duration_ms, energy });
            next_id += 1;
        }
    }

    patterns
}

fn detect_drops(smoothed: &[f32]) -> (Vec<DropMarker>, Vec<crate::song_map::Buildup>) {
    let mut drops = Vec::new();
    let mut buildups = Vec::new();
    let mut last_below_04: Option<u64> = None;
    let mut last_drop_ms: Option<u64> = None;

    for i in 0..smoothed.len() {
        let ms = i as u64 * ENERGY_RESOLUTION_MS;
        if smoothed[i] < 0.4 {
            last_below_04 = Some(ms);
        }

        if i < 15 {
            continue;
        }
        let baseline: f32 = smoothed[i - 15..i].iter().sum::<f32>() / 15.0;
        let five_back_avg = if i >= 20 {
            smoothed[i - 20..i - 5].iter().sum::<f32>() / 15.0
        } else {
            baseline
        };

        if smoothed[i] - five_back_avg >= 0.3 && smoothed[i] > 0.7 {
            let too_close = last_drop_ms.is_some_and(|prev| ms.saturating_sub(prev) < 2000);
            if !too_close {
                drops.push(DropMarker { timestamp_ms: ms });
                if let Some(start) = last_below_04 {
                    buildups.push(crate::song_map::Buildup { start_ms: start, drop_ms: ms });
                }
                last_drop_ms = Some(ms);
            }
        }
    }

    (drops, buildups)
}

/// Builds the per-beat choreography plan for an already-analyzed song against a frame pool.
/// Phase selection, preferred-transition weighting, and the section-mood/transition-mode rules
/// follow the same table the pattern sequencer uses live.
pub fn plan_song(song_map: &mut SongMap, pool: &FramePool, seed: u64) -> Result<(), PlanError> {
    if pool.is_empty() {
        return Err(PlanError::EmptyPool);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut previous_pose: Option<String> = None;
    let mut choreography = Vec::with_capacity(song_map.beats.len());
    let beat_interval_ms = (60_000.0 / song_map.bpm.max(1.0)) as u64;
    // One fixed frame sequence per detected pattern id, generated on its first occurrence and
    // replayed on every later occurrence (§4.H: "signature sequence, cycled across occurrences").
    let mut pattern_sequences: HashMap<u32, Vec<Option<choreo_frames::FrameId>>> = HashMap::new();

    for (beat_index, &timestamp_ms) in song_map.beats.iter().enumerate() {
        let section = song_map.section_at(timestamp_ms);
        let section_type = section.map(|s| s.section_type).unwrap_or(SectionType::Verse);
        let section_energy = section.map(|s| s.energy).unwrap_or(0.0);
        let expected_energy = song_map.energy_at(timestamp_ms);

        let pattern = song_map.repeated_patterns.iter().find(|p| {
            p.occurrences.iter().any(|&o| {
                let span = p.duration_ms.max(1);
                timestamp_ms >= o && timestamp_ms < o + span
            })
        });
        let pattern_slot = pattern.and_then(|p| {
            p.occurrences
                .iter()
                .rev()
                .find(|&&o| timestamp_ms >= o)
                .map(|&o| ((timestamp_ms - o) / beat_interval_ms.max(1)) as usize)
        });

        let beat_in_bar = (beat_index % 16) as u32;
        let phase = match beat_in_bar {
            0..=3 => Phase::Warmup,
            4..=7 => Phase::SwingLeft,
            8..=11 => Phase::SwingRight,
            12..=13 => Phase::Drop,
            _ => Phase::Chaos,
        };

        let candidates: Vec<_> = pool
            .frames()
            .iter()
            .filter(|f| f.best_phases.contains(&phase))
            .map(|f| f.id)
            .collect();

        let weighted_pick = match (pattern, pattern_slot) {
            (Some(p), Some(slot)) => {
                let sequence = pattern_sequences.entry(p.id).or_default();
                if slot >= sequence.len() {
                    sequence.resize(slot + 1, None);
                }
                if sequence[slot].is_none() {
                    sequence[slot] = weighted_pick_preferring_transitions(
                        pool,
                        &candidates,
                        previous_pose.as_deref(),
                        &mut rng,
                    );
                }
                sequence[slot]
            }
            _ => weighted_pick_preferring_transitions(
                pool,
                &candidates,
                previous_pose.as_deref(),
                &mut rng,
            ),
        };

        let is_downbeat = song_map.downbeats.contains(&timestamp_ms);
        let beat_strength = expected_energy;

        let transition_mode = if is_downbeat && section_type == SectionType::Drop {
            PlannedTransition::Cut
        } else if weighted_pick.as_ref().and_then(|id| pool.get(*id)).map(|f| f.frame_type)
            == Some(choreo_frames::FrameType::Closeup)
        {
            PlannedTransition::ZoomIn
        } else if matches!(phase, Phase::SwingLeft | Phase::SwingRight) {
            PlannedTransition::Slide
        } else if matches!(phase, Phase::Ambient | Phase::Warmup) {
            PlannedTransition::Smooth
        } else if beat_strength > 0.7 {
            PlannedTransition::Cut
        } else {
            PlannedTransition::Morph
        };

        let energy_scale = beat_strength * section_energy;
        let fx_mode = match section_type {
            SectionType::Drop => "flash",
            SectionType::Breakdown => "none",
            _ => "normal",
        };

        previous_pose = weighted_pick.and_then(|id| pool.get(id)).map(|f| f.pose.clone());

        choreography.push(BeatChoreography {
            beat_index: beat_index as u32,
            timestamp_ms,
            frame_id: weighted_pick,
            transition_mode,
            transition_speed: transition_mode_default_speed(transition_mode),
            target_rotation: [energy_scale * 35.0, 0.0, energy_scale * 15.0],
            target_squash: 0.85 + 0.15 * (1.0 - energy_scale),
            target_bounce: -50.0 * energy_scale,
            fx_mode: fx_mode.to_string(),
            rgb_split: 0.0,
            flash: if fx_mode == "flash" { 0.4 } else { 0.0 },
            phase,
            section_type,
            mood: mood_for(section_type, section_energy),
            is_signature_move: pattern.is_some(),
            pattern_id: pattern.map(|p| p.id),
            expected_energy,
        });
    }

    song_map.choreography = choreography;
    Ok(())
}

fn transition_mode_default_speed(mode: PlannedTransition) -> f32 {
    match mode {
        PlannedTransition::Cut => 100.0,
        PlannedTransition::ZoomIn => 6.0,
        PlannedTransition::Slide => 8.0,
        PlannedTransition::Smooth => 3.0,
        PlannedTransition::Morph => 5.0,
    }
}

fn weighted_pick_preferring_transitions(
    pool: &FramePool,
    candidates: &[choreo_frames::FrameId],
    previous_pose: Option<&str>,
    rng: &mut StdRng,
) -> Option<choreo_frames::FrameId> {
    let ids = if candidates.is_empty() { pool.all_ids() } else { candidates.to_vec() };
    if ids.is_empty() {
        return None;
    }

    let weighted: Vec<(choreo_frames::FrameId, f32)> = ids
        .iter()
        .map(|&id| {
            let frame = pool.get(id);
            let base = frame.map(|f| f.weight.max(0.01)).unwrap_or(0.01);
            let boosted = if frame.map(|f| f.preferred_transitions.contains(&id)).unwrap_or(false)
            {
                base * 2.0
            } else {
                base
            };
            (id, boosted)
        })
        .collect();

    let total: f32 = weighted.iter().map(|(_, w)| *w).sum();
    let mut roll = rng.gen_range(0.0..total.max(1e-6));
    for (id, w) in &weighted {
        if roll < *w {
            let is_dup = previous_pose
                .map(|p| pool.get(*id).map(|f| f.pose.as_str()) == Some(p))
                .unwrap_or(false);
            if is_dup && weighted.len() > 1 {
                continue;
            }
            return Some(*id);
        }
        roll -= w;
    }
    weighted.last().map(|(id, _)| *id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use choreo_frames::Category;

    fn silent_samples(sample_rate: u32, seconds: f32) -> Vec<f32> {
        vec![0.0f32; (sample_rate as f32 * seconds) as usize]
    }

    #[test]
    fn analysis_rejects_buffers_shorter_than_one_window() {
        let cancel = Arc::new(AtomicBool::new(false));
        let result = analyze_song(&[0.0; 10], 44100, &cancel);
        assert!(matches!(result, Err(PlanError::BufferTooShort { .. })));
    }

    #[test]
    fn silent_song_falls_back_to_default_bpm() {
        let cancel = Arc::new(AtomicBool::new(false));
        let samples = silent_samples(44100, 2.0);
        let song_map = analyze_song(&samples, 44100, &cancel).unwrap();
        assert_eq!(song_map.bpm, 120.0);
        assert!(song_map.drops.is_empty());
    }

    #[test]
    fn plan_song_rejects_empty_pool() {
        let mut song_map = SongMap {
            duration_ms: 1000,
            bpm: 120.0,
            time_signature: (4, 4),
            beats: vec![0, 500],
            downbeats: vec![0],
            sections: Vec::new(),
            repeated_patterns: Vec::new(),
            energy_profile: vec![0.1; 20],
            drops: Vec::new(),
            buildups: Vec::new(),
            choreography: Vec::new(),
        };
        let pool = FramePool::new(Category::Character);
        assert!(matches!(plan_song(&mut song_map, &pool, 1), Err(PlanError::EmptyPool)));
    }

    #[test]
    fn cancellation_flag_aborts_analysis() {
        let cancel = Arc::new(AtomicBool::new(true));
        let samples = silent_samples(44100, 2.0);
        let result = analyze_song(&samples, 44100, &cancel);
        assert!(matches!(result, Err(PlanError::AnalysisAborted)));
    }
}
