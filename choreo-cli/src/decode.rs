//! Audio file decoding via symphonia, with rubato resampling to the engine's working sample
//! rate. Grounded directly on `ole-library::loader::TrackLoader`, downmixed to mono since the
//! analysis pipeline only ever consumes a single channel.

use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

pub const WORKING_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no audio track found in file")]
    NoAudioTrack,
    #[error("decode error: {0}")]
    Decode(String),
    #[error("resample error: {0}")]
    Resample(String),
}

pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decodes `path` to mono f32 samples at [`WORKING_SAMPLE_RATE`].
pub fn decode_file(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::Decode(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_sample_rate = codec_params.sample_rate.unwrap_or(44_100);
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2).max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Decode(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let spec = *decoded.spec();
        let duration = decoded.capacity() as u64;
        let mut sample_buf = SampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sample_buf.samples());
    }

    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    let (samples, sample_rate) = if source_sample_rate != WORKING_SAMPLE_RATE {
        (resample_mono(&mono, source_sample_rate, WORKING_SAMPLE_RATE)?, WORKING_SAMPLE_RATE)
    } else {
        (mono, source_sample_rate)
    };

    Ok(DecodedAudio { samples, sample_rate })
}

fn resample_mono(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>, DecodeError> {
    use rubato::{FftFixedInOut, Resampler};

    let mut resampler = FftFixedInOut::<f32>::new(source_rate as usize, target_rate as usize, 1024, 1)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let chunk_size = resampler.input_frames_next();
    let mut output = Vec::new();
    let mut pos = 0;

    while pos + chunk_size <= samples.len() {
        let chunk = [&samples[pos..pos + chunk_size]];
        let resampled =
            resampler.process(&chunk, None).map_err(|e| DecodeError::Resample(e.to_string()))?;
        output.extend(&resampled[0]);
        pos += chunk_size;
    }

    if pos < samples.len() {
        let remaining = samples.len() - pos;
        let mut padded = samples[pos..].to_vec();
        padded.resize(chunk_size, 0.0);
        if let Ok(resampled) = resampler.process(&[&padded[..]], None) {
            let output_frames = (remaining * target_rate as usize) / source_rate as usize;
            output.extend(&resampled[0][..output_frames.min(resampled[0].len())]);
        }
    }

    Ok(output)
}
