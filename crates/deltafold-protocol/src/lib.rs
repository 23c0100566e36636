//! Canonical protocol types for deltafold.
//!
//! This crate defines the wire unit (`Delta`) and the read-only snapshots the
//! processor publishes to renderers:
//!
//! ```text
//! Generation backend --[append-only delta log]--> deltafold processor
//!                                                      |
//!                                   ArtifactState / ResearchState snapshots
//!                                                      |
//!                                               renderers, progress UI
//! ```
//!
//! ## Design Principles
//!
//! 1. **Deltas are immutable.** The processor only reads the log, never edits it.
//! 2. **Tags are a closed set with an open edge.** Built-in tags parse into
//!    [`DeltaTag`]; anything else stays a raw string so new content kinds and
//!    namespaced auxiliary channels pass through without a protocol bump.
//! 3. **Snapshots are plain data.** They serialize to camelCase JSON and export
//!    TypeScript definitions for the rendering layer.

pub mod delta;
pub mod state;

pub use delta::{
    ActivityUpdate, ArtifactDelta, Delta, DeltaTag, Domain, PayloadError, ResearchDelta,
};
pub use state::{
    ActivityItem, ActivityStatus, ActivityType, ArtifactState, ArtifactStatus, DEFAULT_KIND,
    ResearchState, SourceItem,
};
