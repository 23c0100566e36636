//! The built-in kinds: text, code, sheet, image, html.
//!
//! All five share one shape: a string payload that is either appended to or
//! replaces the content, plus an optional one-shot "whole object" tag that
//! replaces the content and ends streaming.

use std::sync::Arc;

use deltafold_protocol::{ArtifactState, ArtifactStatus, Delta, DeltaTag};

use super::{KindPlugin, VisibilityPolicy};
use crate::error::FoldResult;

/// How an incremental payload combines with existing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldMode {
    Append,
    Replace,
}

/// A kind whose content deltas are plain strings.
#[derive(Debug, Clone)]
pub struct StreamingKind {
    kind: String,
    delta_tag: String,
    final_tag: Option<String>,
    mode: FoldMode,
    visibility: VisibilityPolicy,
}

impl StreamingKind {
    pub fn new(
        kind: impl Into<String>,
        delta_tag: impl Into<String>,
        mode: FoldMode,
        visibility: VisibilityPolicy,
    ) -> Self {
        Self {
            kind: kind.into(),
            delta_tag: delta_tag.into(),
            final_tag: None,
            mode,
            visibility,
        }
    }

    /// Add a terminal tag that replaces the content and sets the artifact idle.
    pub fn with_final_tag(mut self, tag: impl Into<String>) -> Self {
        self.final_tag = Some(tag.into());
        self
    }

    fn is_final(&self, tag: &str) -> bool {
        self.final_tag.as_deref() == Some(tag)
    }

    /// Whether folding `payload` into `state` enters the reveal window.
    ///
    /// Characters are only counted while the content can still be below the
    /// band, so a long append stream does not rescan its whole content.
    fn reveals(&self, state: &ArtifactState, payload: &str, appends: bool) -> bool {
        let VisibilityPolicy::Band { lower, .. } = self.visibility else {
            return self.visibility.reveals(state.status, 0, 0);
        };
        if state.status != ArtifactStatus::Streaming {
            return false;
        }
        // A char is at most four bytes, so this content already has `lower` chars.
        if state.content.len() >= lower.saturating_mul(4) {
            return false;
        }

        let prev_len = state.content_len();
        let added = payload.chars().count();
        let new_len = if appends { prev_len + added } else { added };
        self.visibility.reveals(state.status, prev_len, new_len)
    }
}

impl KindPlugin for StreamingKind {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn claims(&self, tag: &str) -> bool {
        tag == self.delta_tag || self.is_final(tag)
    }

    fn visibility(&self) -> VisibilityPolicy {
        self.visibility
    }

    fn fold(&self, delta: &Delta, state: &ArtifactState) -> FoldResult<ArtifactState> {
        let payload = delta.text()?;
        let appends = self.mode == FoldMode::Append && !self.is_final(&delta.tag);
        let reveal = !state.is_visible && self.reveals(state, payload, appends);

        let mut next = state.clone();
        if appends {
            next.content.push_str(payload);
        } else {
            next.content = payload.to_string();
        }
        next.status = if self.is_final(&delta.tag) {
            ArtifactStatus::Idle
        } else {
            ArtifactStatus::Streaming
        };
        if reveal {
            next.is_visible = true;
        }
        Ok(next)
    }
}

/// The default plugin set, with configurable reveal bands for text and code.
pub fn builtin_plugins(
    text_band: VisibilityPolicy,
    code_band: VisibilityPolicy,
) -> Vec<Arc<dyn KindPlugin>> {
    vec![
        Arc::new(StreamingKind::new(
            "text",
            DeltaTag::TextDelta.as_str(),
            FoldMode::Append,
            text_band,
        )),
        Arc::new(StreamingKind::new(
            "code",
            DeltaTag::CodeDelta.as_str(),
            FoldMode::Append,
            code_band,
        )),
        Arc::new(StreamingKind::new(
            "sheet",
            DeltaTag::SheetDelta.as_str(),
            FoldMode::Replace,
            VisibilityPolicy::OnFirstContent,
        )),
        Arc::new(StreamingKind::new(
            "image",
            DeltaTag::ImageDelta.as_str(),
            FoldMode::Replace,
            VisibilityPolicy::OnFirstContent,
        )),
        Arc::new(
            StreamingKind::new(
                "html",
                DeltaTag::HtmlDelta.as_str(),
                FoldMode::Replace,
                VisibilityPolicy::OnFirstContent,
            )
            .with_final_tag(DeltaTag::Html.as_str()),
        ),
    ]
}
