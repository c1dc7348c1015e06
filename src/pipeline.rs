//! Glues the four extraction stages (A resample/frame, B spectrogram,
//! C peaks, D hashes) into the one deterministic pass both ingest and
//! query run, and wires that pass to the index/matcher for the two
//! top-level operations the core exposes.

use rayon::prelude::*;

use crate::catalog::{TrackId, TrackMeta};
use crate::config::Config;
use crate::error::Error;
use crate::framer::{self, AudioSource};
use crate::hashing::{self, Fingerprint};
use crate::index::Index;
use crate::matcher::{self, MatchOutcome};
use crate::peaks;
use crate::spectrogram;

/// Runs A -> B -> C -> D against one audio source and returns its
/// fingerprints. Used identically for ingest and for query; the only
/// difference between the two call sites is what happens to the result.
pub fn extract(source: &mut dyn AudioSource, config: &Config) -> Result<Vec<Fingerprint>, Error> {
    let frames = framer::frames_from_source(source, config.fs, config.w, config.h)?;
    let spectra = spectrogram::spectrogram(&frames);
    let peaks = peaks::find_peaks(
        &spectra,
        config.delta_t,
        config.delta_f,
        config.alpha,
        config.g_abs,
        config.target_density,
        config.fs,
        config.h,
    );
    let fingerprints = hashing::create_hashes(
        &peaks,
        config.delta_min,
        config.delta_max,
        config.f_fan,
        config.k_fan,
    );

    tracing::info!(
        frames = frames.len(),
        peaks = peaks.len(),
        fingerprints = fingerprints.len(),
        "extracted fingerprints"
    );
    Ok(fingerprints)
}

/// Extracts and atomically stores a new track. Cancelling before this
/// returns (e.g. dropping the call) leaves the index unchanged, since the
/// underlying transaction never commits.
pub fn ingest(
    index: &mut dyn Index,
    source: &mut dyn AudioSource,
    meta: &TrackMeta,
    config: &Config,
) -> Result<TrackId, Error> {
    let fingerprints = extract(source, config)?;
    index.insert_track(meta, &fingerprints)
}

/// Extracts and matches against the catalog. An empty fingerprint set
/// (e.g. silence) yields [`MatchOutcome::NoMatch`] rather than an error.
pub fn identify(
    index: &dyn Index,
    source: &mut dyn AudioSource,
    config: &Config,
) -> Result<MatchOutcome, Error> {
    let fingerprints = match extract(source, config) {
        Ok(fps) => fps,
        Err(Error::EmptyAudio) => Vec::new(),
        Err(err) => return Err(err),
    };
    matcher::identify(index, &fingerprints, config)
}

/// Extracts fingerprints for a batch of tracks in parallel across a
/// `rayon` thread pool (spec §5: "per-track ingest across multiple
/// workers"), then inserts each result into `index` sequentially. The
/// expensive part (resampling, FFT, peak picking, hashing) is what
/// actually parallelizes; the index commit is serialized because a single
/// `rusqlite::Connection`-backed [`Index`] is not safely shared across
/// threads (see [`crate::store::Store`]'s own doc comment). Callers who
/// need parallel *commits* too should give each worker its own `Index`
/// handle against the same file.
pub fn ingest_batch(
    index: &mut dyn Index,
    items: Vec<(Box<dyn AudioSource + Send>, TrackMeta)>,
    config: &Config,
) -> Vec<Result<TrackId, Error>> {
    let extracted: Vec<(Result<Vec<Fingerprint>, Error>, TrackMeta)> = items
        .into_par_iter()
        .map(|(mut source, meta)| (extract(source.as_mut(), config), meta))
        .collect();

    extracted
        .into_iter()
        .map(|(fingerprints, meta)| {
            let fingerprints = fingerprints?;
            index.insert_track(&meta, &fingerprints)
        })
        .collect()
}
