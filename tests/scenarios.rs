//! End-to-end scenarios exercising the whole ingest/identify path against a
//! real (file-backed) SQLite store.

use std::f32::consts::PI;

use stria::catalog::TrackMeta;
use stria::config::Config;
use stria::error::Error;
use stria::framer::AudioSource;
use stria::matcher::MatchOutcome;
use stria::pipeline::{identify, ingest};
use stria::store::Store;

struct SineSource {
    sample_rate: u32,
    samples: Vec<f32>,
    consumed: bool,
}

impl SineSource {
    fn new(freqs: &[f32], sample_rate: u32, duration_secs: f32) -> Self {
        let n = (sample_rate as f32 * duration_secs) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                freqs.iter().map(|&f| (2.0 * PI * f * t).sin()).sum::<f32>() / freqs.len() as f32
            })
            .collect();
        SineSource {
            sample_rate,
            samples,
            consumed: false,
        }
    }

    fn silence(sample_rate: u32, duration_secs: f32) -> Self {
        let n = (sample_rate as f32 * duration_secs) as usize;
        SineSource {
            sample_rate,
            samples: vec![0.0; n],
            consumed: false,
        }
    }

    /// An excerpt of an already-generated clip, `[offset_ms, offset_ms + duration_ms)`.
    fn excerpt(full: &SineSource, offset_ms: u64, duration_secs: f32) -> Self {
        let start = (full.sample_rate as u64 * offset_ms / 1000) as usize;
        let len = (full.sample_rate as f32 * duration_secs) as usize;
        let samples = full.samples[start..(start + len).min(full.samples.len())].to_vec();
        SineSource {
            sample_rate: full.sample_rate,
            samples,
            consumed: false,
        }
    }

    /// Same samples, but declared at a sample rate 1% higher than actual,
    /// so the framer's resampler then compresses them, exactly as if the
    /// clip had been played back 1% faster before capture.
    fn sped_up(full: &SineSource, factor: f32) -> Self {
        SineSource {
            sample_rate: (full.sample_rate as f32 * factor) as u32,
            samples: full.samples.clone(),
            consumed: false,
        }
    }
}

impl AudioSource for SineSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn channels(&self) -> u16 {
        1
    }
    fn read_all(&mut self) -> Result<Vec<f32>, Error> {
        self.consumed = true;
        Ok(self.samples.clone())
    }
}

/// An [`AudioSource`] that fails partway through, simulating a cancelled
/// ingest: the caller never gets a completed sample buffer to extract from.
struct CancelledSource;

impl AudioSource for CancelledSource {
    fn sample_rate(&self) -> u32 {
        11_025
    }
    fn channels(&self) -> u16 {
        1
    }
    fn read_all(&mut self) -> Result<Vec<f32>, Error> {
        Err(Error::Cancelled)
    }
}

fn meta(title: &str) -> TrackMeta {
    TrackMeta {
        title: title.to_string(),
        artist: "Scenario".to_string(),
        duration_ms: 0,
    }
}

fn delta_ms(delta_frames: i64, config: &Config) -> f64 {
    delta_frames as f64 * config.h as f64 / config.fs as f64 * 1000.0
}

#[test]
fn s1_self_match_aligns_within_one_hop() {
    let config = Config::default();
    let mut store = Store::open_in_memory(&config).unwrap();

    let mut full = SineSource::new(&[1000.0], config.fs, 10.0);
    let track_id = ingest(&mut store, &mut full, &meta("Tone"), &config).unwrap();

    let mut query = SineSource::new(&[1000.0], config.fs, 10.0);
    match identify(&store, &mut query, &config).unwrap() {
        MatchOutcome::Matched { candidate, .. } => {
            assert_eq!(candidate.track_id, track_id);
            let offset = delta_ms(candidate.delta_frames, &config);
            assert!((-185.0..=185.0).contains(&offset), "offset {offset} out of bounds");
        }
        other => panic!("expected a match, got {other:?}"),
    }
}

#[test]
fn s2_offset_excerpt_recovers_track_and_alignment() {
    let config = Config::default();
    let mut store = Store::open_in_memory(&config).unwrap();

    let mut track_a = SineSource::new(&[300.0, 600.0], config.fs, 15.0);
    ingest(&mut store, &mut track_a, &meta("Track A"), &config).unwrap();

    let mut track_b_full = SineSource::new(&[900.0, 1400.0], config.fs, 30.0);
    let track_b_id = ingest(&mut store, &mut track_b_full, &meta("Track B"), &config).unwrap();

    let mut excerpt = SineSource::excerpt(&track_b_full, 20_000, 5.0);
    match identify(&store, &mut excerpt, &config).unwrap() {
        MatchOutcome::Matched { candidate, .. } => {
            assert_eq!(candidate.track_id, track_b_id);
            let offset = delta_ms(candidate.delta_frames, &config);
            assert!(
                (19_815.0..=20_185.0).contains(&offset),
                "offset {offset} out of bounds"
            );
        }
        other => panic!("expected a match, got {other:?}"),
    }
}

#[test]
fn s3_silence_query_is_no_match() {
    let config = Config::default();
    let mut store = Store::open_in_memory(&config).unwrap();

    let mut track_a = SineSource::new(&[440.0], config.fs, 10.0);
    ingest(&mut store, &mut track_a, &meta("Track A"), &config).unwrap();

    let mut silent = SineSource::silence(config.fs, 10.0);
    let outcome = identify(&store, &mut silent, &config).unwrap();
    assert!(matches!(outcome, MatchOutcome::NoMatch { ranked } if ranked.is_empty()));
}

#[test]
fn s4_mismatched_window_size_is_schema_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.sqlite");

    let built_with = Config {
        w: 2048,
        ..Config::default()
    };
    {
        let _store = Store::open(&path, &built_with).unwrap();
    }

    let runtime = Config {
        w: 4096,
        ..Config::default()
    };
    let reopened = Store::open(&path, &runtime);
    assert!(matches!(reopened, Err(Error::SchemaMismatch(_))));
}

#[test]
fn s5_cancelled_ingest_leaves_no_trace() {
    let config = Config::default();
    let mut store = Store::open_in_memory(&config).unwrap();

    let mut track_b = SineSource::new(&[700.0], config.fs, 10.0);
    let track_b_id = ingest(&mut store, &mut track_b, &meta("Track B"), &config).unwrap();

    let mut cancelled_source = CancelledSource;
    let result = ingest(&mut store, &mut cancelled_source, &meta("Track B take 2"), &config);
    assert!(matches!(result, Err(Error::Cancelled)));

    // The earlier, successful ingest of B is untouched; identifying its own
    // excerpt still resolves to the one B that actually committed.
    let mut excerpt = SineSource::new(&[700.0], config.fs, 10.0);
    match identify(&store, &mut excerpt, &config).unwrap() {
        MatchOutcome::Matched { candidate, .. } => assert_eq!(candidate.track_id, track_b_id),
        other => panic!("expected a match, got {other:?}"),
    }
}

#[test]
fn s6_time_scaled_playback_still_identifies() {
    let config = Config::default();
    let mut store = Store::open_in_memory(&config).unwrap();

    let mut full = SineSource::new(&[500.0, 1200.0, 2000.0], config.fs, 15.0);
    let track_id = ingest(&mut store, &mut full, &meta("Track"), &config).unwrap();

    let mut sped_up = SineSource::sped_up(&full, 1.01);
    match identify(&store, &mut sped_up, &config).unwrap() {
        MatchOutcome::Matched { candidate, .. } => {
            assert_eq!(candidate.track_id, track_id);
            assert!(candidate.score >= config.n_min);
        }
        other => panic!("expected a match despite 1% speed-up, got {other:?}"),
    }
}
