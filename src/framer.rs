//! Resampler / framer (component A).
//!
//! Downmixes an [`AudioSource`] to mono, resamples it to the canonical rate
//! with a fixed, deterministic sinc filter, and slices the result into
//! fixed-size overlapping frames. A trailing partial frame is discarded.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::Error;

/// The external collaborator interface the core consumes for raw audio
/// (spec §6): "produces `(Fs_in, channels, sample_stream)`". The core does
/// not decode container formats itself; concrete adapters live in
/// [`crate::decode`] and [`crate::capture`].
pub trait AudioSource {
    /// The source's native sample rate, before resampling.
    fn sample_rate(&self) -> u32;
    /// The source's channel count.
    fn channels(&self) -> u16;
    /// Pulls the entire remaining stream as interleaved samples.
    fn read_all(&mut self) -> Result<Vec<f32>, Error>;
}

/// Fixed, documented resampling filter (spec §9 open question: the
/// resampling filter is unspecified by the source; an implementation must
/// pick one and document it). `sinc_len = 256`, Blackman-Harris windowed,
/// 0.95 cutoff: a standard high-quality configuration that clears the
/// required 60 dB stop-band attenuation with headroom. Two indexes built
/// with different parameters here are different schema versions.
fn resample_filter_params() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Downmixes interleaved multi-channel samples to mono by averaging
/// channels.
fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let channels = channels as usize;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resamples mono `samples` from `fs_in` to `fs_out` using a fixed sinc
/// filter. A no-op when the rates already match.
fn resample_mono(samples: &[f32], fs_in: u32, fs_out: u32) -> Result<Vec<f32>, Error> {
    if fs_in == fs_out || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = fs_out as f64 / fs_in as f64;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0,
        resample_filter_params(),
        samples.len(),
        1,
    )
    .map_err(|e| Error::InvalidAudio(format!("failed to build resampler: {e}")))?;

    let waves_in = vec![samples.to_vec()];
    let waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| Error::InvalidAudio(format!("resampling failed: {e}")))?;

    Ok(waves_out.into_iter().next().unwrap_or_default())
}

/// Slices `samples` into fixed-size frames of `window` with `hop` between
/// consecutive frame starts. The trailing partial frame, if any, is
/// dropped.
fn frame_samples(samples: &[f32], window: usize, hop: usize) -> Vec<Vec<f32>> {
    if samples.len() < window {
        return Vec::new();
    }
    let num_frames = (samples.len() - window) / hop + 1;
    (0..num_frames)
        .map(|i| {
            let start = i * hop;
            samples[start..start + window].to_vec()
        })
        .collect()
}

/// Reads a whole [`AudioSource`], downmixes, resamples to `fs_out`, and
/// frames at `(window, hop)`. Returns [`Error::EmptyAudio`] if fewer than
/// one full frame can be produced.
pub fn frames_from_source(
    source: &mut dyn AudioSource,
    fs_out: u32,
    window: usize,
    hop: usize,
) -> Result<Vec<Vec<f32>>, Error> {
    if source.channels() == 0 {
        return Err(Error::InvalidAudio("zero-channel audio source".into()));
    }

    let interleaved = source.read_all()?;
    let mono = downmix_to_mono(&interleaved, source.channels());
    let resampled = resample_mono(&mono, source.sample_rate(), fs_out)?;
    let frames = frame_samples(&resampled, window, hop);

    if frames.is_empty() {
        return Err(Error::EmptyAudio);
    }

    tracing::debug!(
        frames = frames.len(),
        fs_in = source.sample_rate(),
        fs_out,
        "framed audio source"
    );
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        sample_rate: u32,
        channels: u16,
        samples: Vec<f32>,
    }

    impl AudioSource for FixedSource {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
        fn channels(&self) -> u16 {
            self.channels
        }
        fn read_all(&mut self) -> Result<Vec<f32>, Error> {
            Ok(self.samples.clone())
        }
    }

    #[test]
    fn downmix_averages_stereo_channels() {
        let mono = downmix_to_mono(&[1.0, 3.0, 2.0, 4.0], 2);
        assert_eq!(mono, vec![2.0, 3.0]);
    }

    #[test]
    fn too_short_is_empty_audio() {
        let mut source = FixedSource {
            sample_rate: 11_025,
            channels: 1,
            samples: vec![0.0; 100],
        };
        let result = frames_from_source(&mut source, 11_025, 4096, 2048);
        assert!(matches!(result, Err(Error::EmptyAudio)));
    }

    #[test]
    fn zero_channels_is_invalid() {
        let mut source = FixedSource {
            sample_rate: 11_025,
            channels: 0,
            samples: vec![0.0; 4096],
        };
        let result = frames_from_source(&mut source, 11_025, 4096, 2048);
        assert!(matches!(result, Err(Error::InvalidAudio(_))));
    }

    #[test]
    fn exact_multiple_frames_no_partial() {
        let mut source = FixedSource {
            sample_rate: 11_025,
            channels: 1,
            samples: vec![0.0; 4096 + 2048 + 100],
        };
        let frames = frames_from_source(&mut source, 11_025, 4096, 2048).unwrap();
        // (6244 - 4096) / 2048 + 1 = 2 full frames, trailing 100 samples dropped.
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == 4096));
    }
}
