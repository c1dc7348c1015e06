//! The complete, closed set of tunables the core consumes (spec §6).
//!
//! Unknown keys in a config file are a hard error, not a warning: this is
//! a deliberate design choice to keep configuration a closed record rather
//! than a free-form document.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;

/// Canonical sample rate, window, and hop. Changing any of these changes
/// the fingerprint schema and requires bumping [`Config::schema_version`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Canonical sample rate in Hz, after resampling.
    pub fs: u32,
    /// FFT window size in samples.
    pub w: usize,
    /// Hop size in samples between consecutive frames.
    pub h: usize,

    /// Peak neighborhood half-width in frames.
    pub delta_t: usize,
    /// Peak neighborhood half-width in bins.
    pub delta_f: usize,
    /// Multiplier applied to the local running mean magnitude.
    pub alpha: f32,
    /// Absolute magnitude floor a peak must clear regardless of `alpha`.
    pub g_abs: f32,
    /// Target peak density, in peaks per second, used to adapt `alpha`.
    pub target_density: f32,

    /// Minimum target-zone time offset, in frames.
    pub delta_min: usize,
    /// Maximum target-zone time offset, in frames.
    pub delta_max: usize,
    /// Maximum number of target peaks paired per anchor.
    pub k_fan: usize,
    /// Maximum absolute frequency-bin distance for a target peak.
    pub f_fan: usize,

    /// Posting-list length above which a hash is considered non-selective
    /// and skipped on lookup.
    pub p_max: usize,

    /// Minimum top-candidate peak count required to accept a match.
    pub n_min: usize,
    /// Ratio-test weight applied to the runner-up's peak count.
    pub beta: f32,
    /// Minimum confidence required to accept a match.
    pub conf_threshold: f32,

    /// Fingerprint schema version. Two stores interoperate only if equal.
    pub schema_version: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fs: 11_025,
            w: 4096,
            h: 2048,
            delta_t: 10,
            delta_f: 10,
            alpha: 2.5,
            g_abs: 2.0,
            target_density: 40.0,
            delta_min: 1,
            delta_max: 100,
            k_fan: 5,
            f_fan: 100,
            p_max: 200,
            n_min: 5,
            beta: 0.1,
            // A confident self-match typically clears 0.3-0.4 on clean
            // audio; 0.15 leaves headroom for the ~5 dB SNR robustness
            // bound in the testable properties without admitting noise
            // floor ties between unrelated tracks.
            conf_threshold: 0.15,
            schema_version: 1,
        }
    }
}

impl Config {
    /// Loads a config from a TOML file, rejecting unknown keys.
    pub fn load_from_file(path: &Path) -> Result<Config, Error> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        Ok(config)
    }

    /// Bit width spent on each quantized frequency field in a packed hash,
    /// read straight from the hasher so this can never drift out of sync
    /// with the actual bit layout.
    pub fn hash_freq_bits(&self) -> u32 {
        crate::hashing::FREQ_BITS
    }

    /// Bit width spent on the quantized time delta in a packed hash, read
    /// straight from the hasher.
    pub fn hash_delta_bits(&self) -> u32 {
        crate::hashing::DELTA_BITS
    }

    /// A short, human-readable fingerprint of the parameters that affect
    /// hash determinism, stored in the store header and compared on open.
    pub fn extraction_signature(&self) -> String {
        format!(
            "fs={}/w={}/h={}/fbits={}/dbits={}/pmax={}",
            self.fs,
            self.w,
            self.h,
            self.hash_freq_bits(),
            self.hash_delta_bits(),
            self.p_max,
        )
    }
}
