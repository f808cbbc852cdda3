//! Source payload normalizers.
//!
//! Each normalizer takes one provider payload (already parsed JSON) and emits
//! flat domain records. A payload whose top-level shape is wrong fails the
//! whole call with [`crate::error::IngestError::MalformedSourceData`]; gaps
//! inside an
//! individual entry produce a record with the affected fields left `None`,
//! which the validator then rejects with full diagnostics.
//!
//! Normalizers are pure functions of their input. Re-running one over the
//! same payload yields the same records, so an interrupted run can simply be
//! restarted from the raw file.

pub mod box_score;
pub mod enrich;
pub mod game_ids;
pub mod projections;

pub use box_score::parse_box_score;
pub use game_ids::parse_game_listing;
pub use projections::parse_projections;
