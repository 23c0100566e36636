//! Published state snapshots.
//!
//! These are the read-only views the processor hands to renderers after each
//! fold. They carry no behavior beyond a few derived accessors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Kind assigned to an artifact created before any `kind` delta arrives.
pub const DEFAULT_KIND: &str = "text";

// ============================================================================
// Artifact
// ============================================================================

/// Whether the backend is still producing content for the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ArtifactStatus {
    Streaming,
    #[default]
    Idle,
}

/// The single currently open document/workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ArtifactState {
    /// Backend-assigned document ID (unset until an `id` delta).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub document_id: Option<String>,

    /// Content kind tag (`text`, `code`, `html`, `sheet`, `image`, ...).
    pub kind: String,

    pub title: String,

    pub content: String,

    pub status: ArtifactStatus,

    /// Monotone: once revealed, delta processing never hides it again.
    pub is_visible: bool,

    /// Kind-specific record owned by the kind plugin.
    pub metadata: Value,
}

impl Default for ArtifactState {
    fn default() -> Self {
        Self {
            document_id: None,
            kind: DEFAULT_KIND.to_string(),
            title: String::new(),
            content: String::new(),
            status: ArtifactStatus::Idle,
            is_visible: false,
            metadata: Value::Object(Default::default()),
        }
    }
}

impl ArtifactState {
    pub fn is_streaming(&self) -> bool {
        self.status == ArtifactStatus::Streaming
    }

    /// Content length in characters (what visibility bands measure).
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }
}

// ============================================================================
// Research
// ============================================================================

/// What a research activity entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ActivityType {
    Plan,
    Search,
    Scrape,
    Vectorize,
    Analyze,
    Reasoning,
    Synthesis,
    Thought,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ActivityStatus {
    #[default]
    Pending,
    Complete,
    Error,
    Warning,
}

/// One entry in the research activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ActivityItem {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub status: ActivityStatus,
    pub message: String,
    /// Unix ms.
    #[ts(type = "number")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub depth: Option<u32>,
}

/// A source consulted during research. Duplicates are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SourceItem {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub relevance: f64,
}

/// Progress of the current deep-research turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ResearchState {
    pub current_depth: u32,
    pub max_depth: u32,
    /// May transiently exceed `total_expected_steps`; see [`Self::progress_percent`].
    pub completed_steps: u32,
    pub total_expected_steps: u32,
    pub activity: Vec<ActivityItem>,
    pub sources: Vec<SourceItem>,
    /// One-way latch set by `complete`/`error`, cleared only by `progress-init`.
    pub completed: bool,
    /// Failure reason from a backend `error` delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error: Option<String>,
}

impl ResearchState {
    /// A fresh turn with the given budget.
    pub fn new_turn(max_depth: u32, total_steps: u32) -> Self {
        Self {
            max_depth,
            total_expected_steps: total_steps,
            ..Self::default()
        }
    }

    /// Completion percentage in `[0, 100]`. Zero expected steps reports 0.
    pub fn progress_percent(&self) -> f64 {
        if self.total_expected_steps == 0 {
            return 0.0;
        }
        let ratio = f64::from(self.completed_steps) / f64::from(self.total_expected_steps);
        ratio.clamp(0.0, 1.0) * 100.0
    }
}
