//! Artifact reducer.
//!
//! Applies kind-independent deltas (`id`, `title`, `kind`, `clear`, `finish`)
//! itself and hands content deltas to the plugin registered for the artifact's
//! current kind. Snapshots are `Arc`s: a delta that changes nothing returns the
//! very same `Arc`, so renderers can skip work on pointer equality.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use deltafold_protocol::{
    ArtifactDelta, ArtifactState, ArtifactStatus, DEFAULT_KIND, Delta, Domain,
};

use crate::error::FoldResult;
use crate::kinds::KindRegistry;

/// A fresh artifact, created lazily on the first delta that needs one.
pub fn fresh(registry: &KindRegistry) -> ArtifactState {
    ArtifactState {
        metadata: initial_metadata(registry, DEFAULT_KIND),
        ..ArtifactState::default()
    }
}

fn initial_metadata(registry: &KindRegistry, kind: &str) -> Value {
    registry
        .get(kind)
        .map(|plugin| plugin.initial_metadata())
        .unwrap_or_else(|| Value::Object(Map::new()))
}

/// Fold one artifact-domain delta.
///
/// Kind-independent tags are handled here; any other tag goes to the plugin
/// for the current kind. With no plugin, or a tag the plugin does not claim,
/// the delta is a no-op.
pub fn apply(
    current: Option<&Arc<ArtifactState>>,
    delta: &Delta,
    registry: &KindRegistry,
) -> FoldResult<Arc<ArtifactState>> {
    let base = match current {
        Some(state) => Arc::clone(state),
        None => Arc::new(fresh(registry)),
    };

    match delta.known_tag() {
        Some(tag) if tag.domain() == Domain::Artifact => {
            let event = ArtifactDelta::decode(tag, &delta.content)?;
            Ok(apply_event(base, event, registry))
        }
        _ => apply_content(base, delta, registry),
    }
}

fn apply_event(
    base: Arc<ArtifactState>,
    event: ArtifactDelta,
    registry: &KindRegistry,
) -> Arc<ArtifactState> {
    match event {
        ArtifactDelta::Kind(kind) if kind == base.kind => base,
        ArtifactDelta::Kind(kind) => {
            debug!("artifact kind {} -> {}", base.kind, kind);
            let mut next = (*base).clone();
            next.metadata = initial_metadata(registry, &kind);
            next.kind = kind;
            Arc::new(next)
        }
        ArtifactDelta::Id(id) => {
            let mut next = (*base).clone();
            next.document_id = Some(id);
            next.status = ArtifactStatus::Streaming;
            Arc::new(next)
        }
        ArtifactDelta::Title(title) => {
            let mut next = (*base).clone();
            next.title = title;
            next.status = ArtifactStatus::Streaming;
            Arc::new(next)
        }
        ArtifactDelta::Clear => {
            let mut next = (*base).clone();
            next.content.clear();
            next.status = ArtifactStatus::Streaming;
            Arc::new(next)
        }
        ArtifactDelta::Finish => {
            let mut next = (*base).clone();
            next.status = ArtifactStatus::Idle;
            Arc::new(next)
        }
    }
}

fn apply_content(
    base: Arc<ArtifactState>,
    delta: &Delta,
    registry: &KindRegistry,
) -> FoldResult<Arc<ArtifactState>> {
    let Some(plugin) = registry.get(&base.kind) else {
        debug!("no plugin for kind {}; dropping {}", base.kind, delta.tag);
        return Ok(base);
    };
    if !plugin.claims(&delta.tag) {
        debug!(
            "{} plugin does not claim {}; dropping",
            base.kind, delta.tag
        );
        return Ok(base);
    }
    Ok(Arc::new(plugin.fold(delta, &base)?))
}
