//! Content-kind plugins.
//!
//! A kind plugin owns everything kind-specific about an artifact: which wire
//! tags carry its content, how a content delta folds into the artifact, and
//! when the artifact is revealed. Rendering and user actions are not part of
//! the plugin; renderers look the kind up on their side.

mod registry;
mod streaming;

pub use registry::{CODE_BAND, KindRegistry, KindRegistryBuilder, TEXT_BAND};
pub use streaming::{FoldMode, StreamingKind, builtin_plugins};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use deltafold_protocol::{ArtifactState, ArtifactStatus, Delta};

use crate::error::FoldResult;

/// When an artifact becomes visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum VisibilityPolicy {
    /// Reveal when the content length enters `[lower, upper)` from below while
    /// streaming. A single chunk that jumps past the band does not reveal.
    Band { lower: usize, upper: usize },
    /// Reveal on the first content-bearing delta.
    OnFirstContent,
    /// Never revealed by content deltas.
    Never,
}

impl VisibilityPolicy {
    /// Whether a fold taking content from `prev_len` to `new_len` reveals the
    /// artifact. `status` is the status before the fold.
    pub fn reveals(&self, status: ArtifactStatus, prev_len: usize, new_len: usize) -> bool {
        match *self {
            Self::Band { lower, upper } => {
                status == ArtifactStatus::Streaming
                    && prev_len < lower
                    && (lower..upper).contains(&new_len)
            }
            Self::OnFirstContent => true,
            Self::Never => false,
        }
    }
}

/// Folding capability for one content kind.
pub trait KindPlugin: Send + Sync {
    /// The kind tag this plugin is registered under.
    fn kind(&self) -> &str;

    /// Whether `tag` is a content tag of this kind.
    fn claims(&self, tag: &str) -> bool;

    fn visibility(&self) -> VisibilityPolicy;

    /// Metadata an artifact gets when it switches to this kind.
    fn initial_metadata(&self) -> Value {
        Value::Object(Map::new())
    }

    /// Fold one claimed content delta into the artifact.
    fn fold(&self, delta: &Delta, state: &ArtifactState) -> FoldResult<ArtifactState>;
}
