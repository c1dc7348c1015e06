//! Catalog store (component G), track metadata keyed by `track_id`.
//!
//! The catalog requires only single-key atomicity on its own; consistency
//! with the index (every posting's `track_id` has exactly one Track row)
//! is enforced by the atomic ingest/delete operations on [`crate::index::Index`].

use std::num::NonZeroU32;

use crate::error::Error;

/// A track's identity. Monotonically assigned, never reused (spec
/// invariant 1), backed by SQLite `AUTOINCREMENT`.
pub type TrackId = NonZeroU32;

/// Immutable track metadata supplied by the catalog loader collaborator
/// at ingest time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMeta {
    pub title: String,
    pub artist: String,
    pub duration_ms: u64,
}

/// A catalog row: identity plus metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub track_id: TrackId,
    pub meta: TrackMeta,
}

/// Keyed store from `track_id` to [`TrackMeta`]. Created and deleted
/// through [`crate::index::Index`] so that a track's postings and its
/// metadata row appear or disappear together; `put` is exposed for
/// metadata-only corrections to an already-ingested track.
pub trait Catalog {
    fn put(&mut self, track_id: TrackId, meta: &TrackMeta) -> Result<(), Error>;
    fn get(&self, track_id: TrackId) -> Result<Option<Track>, Error>;
    fn delete(&mut self, track_id: TrackId) -> Result<(), Error>;
    fn iterate(&self) -> Result<Vec<Track>, Error>;
}
