//! Persistence for the pitchforge pipeline.
//!
//! Customer records come from a [`CustomerRepository`], pitch versions go to
//! a [`PitchRepository`], and every agent message of a run is kept by the
//! [`TrailRecorder`], which writes through to a [`TrailStore`] in the
//! background.

/// Customer repositories.
pub mod customer;
/// Pitch version storage.
pub mod pitch_store;
/// Per-run message trails and stage replay.
pub mod trail;

pub use customer::{CustomerRepository, FileCustomerRepository, MemoryCustomerRepository};
pub use pitch_store::{FilePitchStore, MemoryPitchStore, PitchRepository};
pub use trail::{
    replay_stages, FileTrailStore, MemoryTrailStore, PersistRetry, TrailRecorder, TrailStore,
};
