//! Hasher (component D), combining peak pairs into fingerprint hashes.
//!
//! For each anchor peak, every target peak inside the target zone ahead of
//! it is paired into one 32-bit hash: `f_a` and `f_b` quantized to 10 bits
//! each, `delta_t` to 12 bits, packed `f_a | f_b | delta_t` high-to-low.
//! This bit layout is part of the fingerprint schema (spec §4.D), so
//! changing it requires bumping [`crate::config::Config::schema_version`].

use crate::peaks::Peak;

/// Bits spent on each quantized frequency field in a packed hash. Read by
/// [`crate::config::Config::extraction_signature`] so the store header
/// always reflects the hasher's real bit layout.
pub(crate) const FREQ_BITS: u32 = 10;
/// Bits spent on the quantized time delta in a packed hash. Read by
/// [`crate::config::Config::extraction_signature`].
pub(crate) const DELTA_BITS: u32 = 12;
const FREQ_MASK: u32 = (1 << FREQ_BITS) - 1;
const DELTA_MASK: u32 = (1 << DELTA_BITS) - 1;

/// One `(hash, anchor_frame)` fingerprint emitted by the hasher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: u32,
    pub anchor_frame: u32,
}

/// Packs a quantized peak pair into a 32-bit hash. Injective as long as
/// `f_a`, `f_b` fit in 10 bits and `delta_t` fits in 12 bits; callers are
/// expected to keep target-zone parameters within that range (`f_fan` and
/// `delta_max` in the spec's default configuration both do).
pub fn pack(f_a: u32, f_b: u32, delta_t: u32) -> u32 {
    debug_assert!(f_a <= FREQ_MASK, "f_a does not fit in {FREQ_BITS} bits");
    debug_assert!(f_b <= FREQ_MASK, "f_b does not fit in {FREQ_BITS} bits");
    debug_assert!(
        delta_t <= DELTA_MASK,
        "delta_t does not fit in {DELTA_BITS} bits"
    );
    ((f_a & FREQ_MASK) << (FREQ_BITS + DELTA_BITS))
        | ((f_b & FREQ_MASK) << DELTA_BITS)
        | (delta_t & DELTA_MASK)
}

/// Inverse of [`pack`]: recovers `(f_a, f_b, delta_t)` from a packed hash.
pub fn unpack(hash: u32) -> (u32, u32, u32) {
    let delta_t = hash & DELTA_MASK;
    let f_b = (hash >> DELTA_BITS) & FREQ_MASK;
    let f_a = (hash >> (FREQ_BITS + DELTA_BITS)) & FREQ_MASK;
    (f_a, f_b, delta_t)
}

/// For every anchor peak, pairs it with up to `k_fan` target peaks in the
/// target zone `delta_t in [delta_min, delta_max]`, `|delta_f| <= f_fan`,
/// ordered by `(t_b, f_b)` as the spec requires. `peaks` must already be in
/// non-decreasing `(frame, bin)` order (the order [`crate::peaks::find_peaks`]
/// produces).
pub fn create_hashes(
    peaks: &[Peak],
    delta_min: usize,
    delta_max: usize,
    f_fan: usize,
    k_fan: usize,
) -> Vec<Fingerprint> {
    let mut fingerprints = Vec::new();
    if peaks.len() < 2 {
        return fingerprints;
    }

    for i in 0..peaks.len() {
        let anchor = peaks[i];
        let mut paired = 0usize;

        for target in &peaks[i + 1..] {
            if paired >= k_fan {
                break;
            }
            let delta_t = (target.frame - anchor.frame) as usize;
            if delta_t < delta_min {
                continue;
            }
            if delta_t > delta_max {
                // Peaks are frame-ordered, so every later target is even
                // further away: nothing past this point can qualify.
                break;
            }
            let delta_f = (target.bin as i32 - anchor.bin as i32).unsigned_abs() as usize;
            if delta_f > f_fan {
                continue;
            }

            let hash = pack(anchor.bin as u32, target.bin as u32, delta_t as u32);
            fingerprints.push(Fingerprint {
                hash,
                anchor_frame: anchor.frame,
            });
            paired += 1;
        }
    }

    tracing::debug!(
        peaks = peaks.len(),
        fingerprints = fingerprints.len(),
        "generated fingerprints"
    );
    fingerprints
}
