//! Spectrogram stage (component B).
//!
//! Windowed FFT producing a magnitude spectrogram. Deterministic and
//! side-effect-free: no normalization is applied here, matching the spec.

use rayon::prelude::*;
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use std::f32::consts::PI;

/// One frame's magnitude spectrum, bins `[1, W/2]` (the DC bin is dropped).
pub type Spectrum = Vec<f32>;

fn hann_window(window_size: usize) -> Vec<f32> {
    if window_size == 0 {
        return Vec::new();
    }
    if window_size == 1 {
        return vec![1.0];
    }
    (0..window_size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (window_size - 1) as f32).cos()))
        .collect()
}

/// Computes the magnitude spectrum of one windowed frame.
fn spectrum_of_frame(frame: &[f32], window: &[f32], fft: &dyn rustfft::Fft<f32>) -> Spectrum {
    let mut buffer: Vec<Complex<f32>> = frame
        .iter()
        .zip(window)
        .map(|(sample, w)| Complex::new(sample * w, 0.0))
        .collect();

    fft.process(&mut buffer);

    // Bins 1..=W/2: bin 0 is DC, dropped per spec.
    let num_bins = frame.len() / 2;
    buffer[1..=num_bins].iter().map(|c| c.norm()).collect()
}

/// Builds the spectrogram for a sequence of equal-length frames. Frame
/// order in the output matches frame order in the input; when `frames`
/// contains more than one entry, per-frame FFTs run across a `rayon`
/// thread pool, but the result is always collected back into the original
/// order, so the peak picker (component C) sees frames in order regardless
/// of how many threads computed them.
pub fn spectrogram(frames: &[Vec<f32>]) -> Vec<Spectrum> {
    let Some(window_size) = frames.first().map(Vec::len) else {
        return Vec::new();
    };

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(window_size);
    let window = hann_window(window_size);

    frames
        .par_iter()
        .map(|frame| spectrum_of_frame(frame, &window, fft.as_ref()))
        .collect()
}
