//! Peak picker (component C), extracting the constellation map.
//!
//! A cell is a peak when it is a local maximum in a symmetric
//! `(delta_t, delta_f)` neighborhood (ties broken in favor of the
//! lexicographically earliest cell) and clears a dynamic threshold,
//! `max(g_abs, alpha * M[t])`, where `M[t]` is a running local mean
//! magnitude over a `±30` frame window. `alpha` is adapted, within a
//! bounded number of passes, toward a target peak density.

use crate::spectrogram::Spectrum;

/// Running local mean is taken over this many frames on either side.
const LOCAL_MEAN_RADIUS: usize = 30;
/// Bounded retries for the density-adaptive alpha search: the final peak
/// set must stay a deterministic, terminating function of its inputs.
const MAX_DENSITY_ITERS: usize = 4;
/// Acceptable fractional deviation from `target_density` before adapting.
const DENSITY_TOLERANCE: f32 = 0.25;

/// A locally maximal, thresholded time-frequency cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Frame index, counted from the start of the clip.
    pub frame: u32,
    /// Frequency bin index within the (DC-dropped) spectrum.
    pub bin: u16,
    pub magnitude: f32,
}

fn row_mean(spectrum: &Spectrum) -> f32 {
    if spectrum.is_empty() {
        0.0
    } else {
        spectrum.iter().sum::<f32>() / spectrum.len() as f32
    }
}

/// `M[t]` for every frame: the mean of each frame's own mean magnitude,
/// averaged again over a `±LOCAL_MEAN_RADIUS` window of frames.
fn local_means(spectrogram: &[Spectrum]) -> Vec<f32> {
    let row_means: Vec<f32> = spectrogram.iter().map(row_mean).collect();
    let n = row_means.len();
    (0..n)
        .map(|t| {
            let start = t.saturating_sub(LOCAL_MEAN_RADIUS);
            let end = (t + LOCAL_MEAN_RADIUS + 1).min(n);
            let window = &row_means[start..end];
            window.iter().sum::<f32>() / window.len() as f32
        })
        .collect()
}

fn is_local_max(
    spectrogram: &[Spectrum],
    t: usize,
    f: usize,
    delta_t: usize,
    delta_f: usize,
) -> bool {
    let num_frames = spectrogram.len();
    let num_bins = spectrogram[t].len();
    let current = spectrogram[t][f];

    let t_start = t.saturating_sub(delta_t);
    let t_end = (t + delta_t + 1).min(num_frames);
    let f_start = f.saturating_sub(delta_f);
    let f_end = (f + delta_f + 1).min(num_bins);

    for nt in t_start..t_end {
        for nf in f_start..f_end {
            if nt == t && nf == f {
                continue;
            }
            let neighbor = spectrogram[nt][nf];
            if neighbor > current {
                return false;
            }
            if neighbor == current && (nt, nf) < (t, f) {
                return false;
            }
        }
    }
    true
}

fn pick_with_alpha(
    spectrogram: &[Spectrum],
    local_mean: &[f32],
    delta_t: usize,
    delta_f: usize,
    alpha: f32,
    g_abs: f32,
) -> Vec<Peak> {
    let mut peaks = Vec::new();
    for (t, spectrum) in spectrogram.iter().enumerate() {
        let floor = g_abs.max(alpha * local_mean[t]);
        for (f, &magnitude) in spectrum.iter().enumerate() {
            if magnitude < floor {
                continue;
            }
            if is_local_max(spectrogram, t, f, delta_t, delta_f) {
                peaks.push(Peak {
                    frame: t as u32,
                    bin: f as u16,
                    magnitude,
                });
            }
        }
    }
    peaks
}

/// Extracts the constellation map. `fs` and `hop` are used only to convert
/// the clip's duration to seconds for the density-adaptive search; they do
/// not otherwise affect peak selection.
pub fn find_peaks(
    spectrogram: &[Spectrum],
    delta_t: usize,
    delta_f: usize,
    alpha: f32,
    g_abs: f32,
    target_density: f32,
    fs: u32,
    hop: usize,
) -> Vec<Peak> {
    if spectrogram.is_empty() || spectrogram[0].is_empty() {
        return Vec::new();
    }

    let local_mean = local_means(spectrogram);
    let duration_secs = (spectrogram.len() * hop) as f32 / fs as f32;

    let mut alpha = alpha;
    let mut peaks = pick_with_alpha(spectrogram, &local_mean, delta_t, delta_f, alpha, g_abs);

    for _ in 0..MAX_DENSITY_ITERS {
        if duration_secs <= 0.0 || target_density <= 0.0 {
            break;
        }
        let density = peaks.len() as f32 / duration_secs;
        let low = target_density * (1.0 - DENSITY_TOLERANCE);
        let high = target_density * (1.0 + DENSITY_TOLERANCE);
        if density >= low && density <= high {
            break;
        }
        if density <= 0.0 {
            break;
        }
        let ratio = (density / target_density).clamp(0.25, 4.0);
        alpha *= ratio;
        tracing::trace!(alpha, density, target_density, "adapting peak threshold");
        peaks = pick_with_alpha(spectrogram, &local_mean, delta_t, delta_f, alpha, g_abs);
    }

    tracing::debug!(peaks = peaks.len(), duration_secs, "picked peaks");
    peaks
}
