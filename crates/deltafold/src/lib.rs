//! Streaming delta demultiplexer and incremental state reconstructor.
//!
//! A producer emits a totally ordered log of small tagged deltas. This crate
//! folds the unread suffix of that log, in order and exactly once, into two
//! snapshots:
//!
//! - an [`ArtifactState`] for the document being streamed, whose content is
//!   shaped by a per-kind [`KindPlugin`](kinds::KindPlugin)
//! - a [`ResearchState`] for the progress of a research turn
//!
//! Deltas in an auxiliary namespace are forwarded untouched to an
//! [`AuxiliarySink`](auxiliary::AuxiliarySink).
//!
//! ```no_run
//! use deltafold::{Delta, StreamProcessor};
//!
//! let mut processor = StreamProcessor::default();
//! let mut log = vec![Delta::new("id", "doc_1"), Delta::new("text-delta", "Hello")];
//! processor.process_new(&log);
//!
//! log.push(Delta::new("text-delta", ", world"));
//! processor.process_new(&log);
//! assert_eq!(processor.artifact().unwrap().content, "Hello, world");
//! ```

pub mod artifact;
pub mod auxiliary;
pub mod cursor;
pub mod error;
pub mod feed;
pub mod kinds;
pub mod persist;
pub mod processor;
pub mod research;
pub mod settings;

pub use deltafold_protocol;
pub use deltafold_protocol::{ArtifactState, ArtifactStatus, Delta, ResearchState};

pub use cursor::Cursor;
pub use kinds::{KindPlugin, KindRegistry, VisibilityPolicy};
pub use processor::{Diagnostic, ProcessReport, StreamProcessor, demux};
