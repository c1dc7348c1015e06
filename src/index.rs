//! Index (component E), persistent hash to posting-list mapping.
//!
//! Storage is SQLite via `rusqlite` (the concrete choice of the pack's
//! agnostic storage requirement); the trait below is what [`crate::matcher`]
//! and [`crate::pipeline`] depend on, so an alternative backend can be
//! substituted without touching either.

use crate::catalog::TrackId;
use crate::error::Error;
use crate::hashing::Fingerprint;

/// One occurrence of a hash in the catalog: a track and the frame at which
/// the hash's anchor peak occurred in that track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub track_id: TrackId,
    pub anchor_frame: u32,
}

pub trait Index {
    /// Atomically assigns a new `track_id`, stores `meta`, and stores every
    /// posting derived from `postings`. Either all of it becomes visible or
    /// none of it does: a crash or cancellation mid-ingest must leave no
    /// trace of a partial track.
    fn insert_track(
        &mut self,
        meta: &crate::catalog::TrackMeta,
        postings: &[Fingerprint],
    ) -> Result<TrackId, Error>;

    /// Returns every posting for `hash`, or an empty vec if `hash` is
    /// absent or has been marked hot (its posting list exceeds `p_max`
    /// and is therefore considered non-selective).
    fn lookup(&self, hash: u32) -> Result<Vec<Posting>, Error>;

    /// Removes the track row and every posting tagged with `track_id`.
    fn delete_track(&mut self, track_id: TrackId) -> Result<(), Error>;

    /// The schema version this store was created with.
    fn schema_version(&self) -> u32;
}
