//! Domain types for the Atelier generation tracker.
//!
//! Holds the in-memory [`registry::JobRegistry`], the [`job::Job`]
//! record and its forward-only transitions, the pure payload
//! [`correlation`] rules, and the [`artifact::ArtifactStore`] seam used
//! to persist generated images. Nothing in this crate performs network
//! I/O.

pub mod artifact;
pub mod correlation;
pub mod error;
pub mod job;
pub mod registry;
pub mod types;
