//! Delta demultiplexer.
//!
//! Consumes the unread suffix of the transport's delta log, classifies each
//! delta and dispatches it to the research reducer, the artifact reducer or
//! the auxiliary sink. Deltas are folded strictly in arrival order, one at a
//! time, and snapshots are published after every fold that changed them.
//!
//! ## Routing Rules
//!
//! 1. Research tags are dropped while the research latch is set, except
//!    `progress-init`, which clears it.
//! 2. Other research tags go to the research reducer.
//! 3. Kind-independent artifact tags, and content tags claimed by the plugin
//!    of the current kind, go to the artifact reducer.
//! 4. Tags in an auxiliary namespace are forwarded verbatim.
//! 5. Anything else is reported and dropped.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use deltafold_protocol::{
    ArtifactState, ArtifactStatus, DEFAULT_KIND, Delta, DeltaTag, Domain, ResearchDelta,
    ResearchState,
};

use crate::artifact;
use crate::auxiliary::{AuxiliaryRoutes, AuxiliarySink, NullSink};
use crate::cursor::Cursor;
use crate::kinds::KindRegistry;
use crate::persist::{DocumentRecord, DocumentStore};
use crate::research;

// ============================================================================
// Reports
// ============================================================================

/// Something noteworthy that happened while folding. None of these stop
/// processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "diagnostic", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Tag not recognised by any reducer or channel.
    UnknownTag { index: usize, tag: String },

    /// Content tag for a kind other than the current one.
    Unclaimed {
        index: usize,
        tag: String,
        kind: String,
    },

    /// Recognised tag with a payload that could not be folded.
    MalformedPayload {
        index: usize,
        tag: String,
        error: String,
    },

    /// Research delta dropped because the research turn already ended.
    Suppressed { index: usize, tag: String },

    /// The document store failed on finish.
    PersistFailed {
        index: usize,
        document_id: String,
        error: String,
    },

    /// The transport handed over a log shorter than what was consumed.
    LogShrunk { consumed: usize, len: usize },
}

/// Outcome of one [`StreamProcessor::process_new`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    /// Deltas consumed by this call.
    pub folded: usize,
    /// Deltas forwarded to the auxiliary sink.
    pub forwarded: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl ProcessReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Research(DeltaTag),
    Artifact,
    Unclaimed,
    Auxiliary,
    Unknown,
}

// ============================================================================
// Processor
// ============================================================================

/// Folds a delta log into artifact and research snapshots.
///
/// Holds the cursor and the current snapshots explicitly; there is no hidden
/// global state. `process_new` takes `&mut self`, so two folds can never
/// interleave.
pub struct StreamProcessor {
    cursor: Cursor,
    artifact: Option<Arc<ArtifactState>>,
    research: Arc<ResearchState>,
    registry: Arc<KindRegistry>,
    routes: AuxiliaryRoutes,
    aux_sink: Arc<dyn AuxiliarySink>,
    store: Option<Arc<dyn DocumentStore>>,
    artifact_tx: watch::Sender<Option<Arc<ArtifactState>>>,
    research_tx: watch::Sender<Arc<ResearchState>>,
}

impl Default for StreamProcessor {
    fn default() -> Self {
        Self::new(KindRegistry::builtin())
    }
}

impl StreamProcessor {
    pub fn new(registry: Arc<KindRegistry>) -> Self {
        Self::from_parts(
            Cursor::new(),
            registry,
            None,
            Arc::new(ResearchState::default()),
        )
    }

    /// Resume from previously captured state.
    pub fn from_parts(
        cursor: Cursor,
        registry: Arc<KindRegistry>,
        artifact: Option<Arc<ArtifactState>>,
        research: Arc<ResearchState>,
    ) -> Self {
        let (artifact_tx, _) = watch::channel(artifact.clone());
        let (research_tx, _) = watch::channel(Arc::clone(&research));
        Self {
            cursor,
            artifact,
            research,
            registry,
            routes: AuxiliaryRoutes::default(),
            aux_sink: Arc::new(NullSink),
            store: None,
            artifact_tx,
            research_tx,
        }
    }

    pub fn with_auxiliary(
        mut self,
        routes: AuxiliaryRoutes,
        sink: Arc<dyn AuxiliarySink>,
    ) -> Self {
        self.routes = routes;
        self.aux_sink = sink;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn artifact(&self) -> Option<&Arc<ArtifactState>> {
        self.artifact.as_ref()
    }

    pub fn research(&self) -> &Arc<ResearchState> {
        &self.research
    }

    pub fn registry(&self) -> &Arc<KindRegistry> {
        &self.registry
    }

    /// Artifact snapshots, published after each fold that changed the artifact.
    pub fn subscribe_artifact(&self) -> watch::Receiver<Option<Arc<ArtifactState>>> {
        self.artifact_tx.subscribe()
    }

    /// Research snapshots, published after each fold that changed research state.
    pub fn subscribe_research(&self) -> watch::Receiver<Arc<ResearchState>> {
        self.research_tx.subscribe()
    }

    /// Tear down into `(cursor, artifact, research)`.
    pub fn into_parts(self) -> (Cursor, Option<Arc<ArtifactState>>, Arc<ResearchState>) {
        (self.cursor, self.artifact, self.research)
    }

    /// Fold every delta in `log` past the cursor, in order.
    ///
    /// Safe to call repeatedly with a log that only grows; an unchanged log
    /// folds nothing.
    pub fn process_new(&mut self, log: &[Delta]) -> ProcessReport {
        let mut report = ProcessReport::default();

        if self.cursor.is_ahead_of(log.len()) {
            report.diagnostics.push(Diagnostic::LogShrunk {
                consumed: self.cursor.consumed(),
                len: log.len(),
            });
        }

        let start = self.cursor.consumed();
        let fresh = self.cursor.process_new(log);
        for (offset, delta) in fresh.iter().enumerate() {
            self.fold_one(start + offset, delta, &mut report);
            report.folded += 1;
        }

        if report.folded > 0 {
            debug!(
                "folded {} deltas (cursor at {:?}, {} diagnostics)",
                report.folded,
                self.cursor.last_consumed_index(),
                report.diagnostics.len()
            );
        }
        report
    }

    fn active_kind(&self) -> &str {
        self.artifact
            .as_ref()
            .map_or(DEFAULT_KIND, |state| state.kind.as_str())
    }

    fn classify(&self, delta: &Delta) -> Route {
        let claimed = || {
            self.registry
                .get(self.active_kind())
                .is_some_and(|plugin| plugin.claims(&delta.tag))
        };

        match delta.known_tag() {
            Some(tag) => match tag.domain() {
                Domain::Research => Route::Research(tag),
                Domain::Artifact => Route::Artifact,
                Domain::Content if claimed() => Route::Artifact,
                Domain::Content => Route::Unclaimed,
            },
            None if claimed() => Route::Artifact,
            None if self.routes.matches(&delta.tag) => Route::Auxiliary,
            None => Route::Unknown,
        }
    }

    fn fold_one(&mut self, index: usize, delta: &Delta, report: &mut ProcessReport) {
        trace!("delta {index}: {}", delta.tag);
        match self.classify(delta) {
            Route::Research(tag) => self.fold_research(index, tag, delta, report),
            Route::Artifact => self.fold_artifact(index, delta, report),
            Route::Auxiliary => {
                self.aux_sink.forward(delta);
                report.forwarded += 1;
            }
            Route::Unclaimed => {
                let kind = self.active_kind().to_string();
                warn!(
                    "dropping {} at {index}: not a {kind} content tag",
                    delta.tag
                );
                report.diagnostics.push(Diagnostic::Unclaimed {
                    index,
                    tag: delta.tag.clone(),
                    kind,
                });
            }
            Route::Unknown => {
                warn!("dropping unrecognized delta {} at {index}", delta.tag);
                report.diagnostics.push(Diagnostic::UnknownTag {
                    index,
                    tag: delta.tag.clone(),
                });
            }
        }
    }

    fn fold_research(
        &mut self,
        index: usize,
        tag: DeltaTag,
        delta: &Delta,
        report: &mut ProcessReport,
    ) {
        if self.research.completed && tag != DeltaTag::ProgressInit {
            debug!("research latched; dropping {tag} at {index}");
            report.diagnostics.push(Diagnostic::Suppressed {
                index,
                tag: delta.tag.clone(),
            });
            return;
        }

        let event = match ResearchDelta::decode(tag, &delta.content) {
            Ok(event) => event,
            Err(e) => {
                warn!("skipping research delta at {index}: {e}");
                report.diagnostics.push(Diagnostic::MalformedPayload {
                    index,
                    tag: delta.tag.clone(),
                    error: e.to_string(),
                });
                return;
            }
        };

        let next = research::apply(&self.research, &event);
        if !Arc::ptr_eq(&next, &self.research) {
            self.research = next;
            self.research_tx.send_replace(Arc::clone(&self.research));
        }
    }

    fn fold_artifact(&mut self, index: usize, delta: &Delta, report: &mut ProcessReport) {
        let previous_status = self.artifact.as_ref().map(|state| state.status);

        let next = match artifact::apply(self.artifact.as_ref(), delta, &self.registry) {
            Ok(next) => next,
            Err(e) => {
                warn!("skipping artifact delta at {index}: {e}");
                report.diagnostics.push(Diagnostic::MalformedPayload {
                    index,
                    tag: delta.tag.clone(),
                    error: e.to_string(),
                });
                return;
            }
        };

        let changed = self
            .artifact
            .as_ref()
            .is_none_or(|current| !Arc::ptr_eq(current, &next));
        if !changed {
            return;
        }

        let finished = previous_status == Some(ArtifactStatus::Streaming)
            && next.status == ArtifactStatus::Idle;
        self.artifact = Some(Arc::clone(&next));
        self.artifact_tx.send_replace(Some(Arc::clone(&next)));

        if finished {
            self.persist(index, &next, report);
        }
    }

    fn persist(&self, index: usize, state: &ArtifactState, report: &mut ProcessReport) {
        let Some(store) = &self.store else {
            return;
        };
        let Some(record) = DocumentRecord::from_artifact(state) else {
            debug!("finished artifact has no document id; not persisting");
            return;
        };
        if let Err(e) = store.save(&record) {
            warn!("failed to persist document {}: {e}", record.document_id);
            report.diagnostics.push(Diagnostic::PersistFailed {
                index,
                document_id: record.document_id,
                error: e.to_string(),
            });
        }
    }
}

/// Pure view of the processor: fold the unread part of `log` into the given
/// snapshots and return the advanced cursor and new snapshots.
pub fn demux(
    log: &[Delta],
    cursor: Cursor,
    registry: Arc<KindRegistry>,
    artifact: Option<Arc<ArtifactState>>,
    research: Arc<ResearchState>,
) -> (Cursor, Option<Arc<ArtifactState>>, Arc<ResearchState>) {
    let mut processor = StreamProcessor::from_parts(cursor, registry, artifact, research);
    processor.process_new(log);
    processor.into_parts()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auxiliary::RecordingSink;
    use crate::error::PersistError;
    use crate::persist::MemoryDocumentStore;
    use serde_json::json;

    struct FailingStore;

    impl DocumentStore for FailingStore {
        fn save(&self, _document: &DocumentRecord) -> crate::error::PersistResult<()> {
            Err(PersistError::Backend("disk full".into()))
        }
    }

    fn activity(message: &str) -> Delta {
        Delta::new(
            "activity-delta",
            json!({"type": "search", "status": "complete", "message": message, "timestamp": 1}),
        )
    }

    #[test]
    fn test_unchanged_log_folds_nothing() {
        let mut p = StreamProcessor::default();
        let log = vec![
            Delta::new("text-delta", "ab"),
            Delta::new("text-delta", "cd"),
        ];

        let report = p.process_new(&log);
        assert_eq!(report.folded, 2);
        assert_eq!(p.cursor().last_consumed_index(), Some(1));

        let report = p.process_new(&log);
        assert_eq!(report.folded, 0);
        assert_eq!(p.artifact().unwrap().content, "abcd");
    }

    #[test]
    fn test_research_latch_and_reinit() {
        let mut p = StreamProcessor::default();
        let mut log = vec![
            Delta::new("progress-init", json!({"maxDepth": 2, "totalSteps": 4})),
            activity("one"),
            Delta::bare("complete"),
            activity("late"),
        ];
        let report = p.process_new(&log);
        assert!(p.research().completed);
        assert_eq!(p.research().activity.len(), 1);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::Suppressed {
                index: 3,
                tag: "activity-delta".into()
            }]
        );

        log.push(Delta::new("progress-init", json!({"maxDepth": 3, "totalSteps": 9})));
        log.push(activity("fresh"));
        p.process_new(&log);
        assert!(!p.research().completed);
        assert_eq!(p.research().total_expected_steps, 9);
        assert_eq!(p.research().completed_steps, 0);
        assert_eq!(p.research().activity.len(), 1);
        assert_eq!(p.research().activity[0].message, "fresh");
    }

    #[test]
    fn test_error_latches_but_artifacts_continue() {
        let mut p = StreamProcessor::default();
        let log = vec![
            Delta::new("progress-init", json!({"maxDepth": 1, "totalSteps": 1})),
            Delta::new("error", "backend exploded"),
            Delta::new("depth-delta", json!({"current": 1, "max": 1})),
            Delta::new("text-delta", "still here"),
        ];
        let report = p.process_new(&log);
        assert!(p.research().completed);
        assert_eq!(p.research().error.as_deref(), Some("backend exploded"));
        assert_eq!(p.research().current_depth, 0);
        assert_eq!(p.artifact().unwrap().content, "still here");
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn test_unknown_tag_leaves_state_untouched() {
        let mut p = StreamProcessor::default();
        p.process_new(&[Delta::new("text-delta", "abc")]);
        let artifact = Arc::clone(p.artifact().unwrap());
        let research = Arc::clone(p.research());

        let log = vec![
            Delta::new("text-delta", "abc"),
            Delta::new("mystery", json!({"a": 1})),
        ];
        let report = p.process_new(&log);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::UnknownTag {
                index: 1,
                tag: "mystery".into()
            }]
        );
        assert!(Arc::ptr_eq(p.artifact().unwrap(), &artifact));
        assert!(Arc::ptr_eq(p.research(), &research));
    }

    #[test]
    fn test_unclaimed_content_tag_is_reported() {
        let mut p = StreamProcessor::default();
        let report = p.process_new(&[
            Delta::new("kind", "code"),
            Delta::new("sheet-delta", "a,b"),
        ]);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::Unclaimed {
                index: 1,
                tag: "sheet-delta".into(),
                kind: "code".into()
            }]
        );
        assert_eq!(p.artifact().unwrap().content, "");
    }

    #[test]
    fn test_malformed_payload_keeps_prior_state() {
        let mut p = StreamProcessor::default();
        let report = p.process_new(&[
            Delta::new("title", "Draft"),
            Delta::new("title", json!({"not": "a string"})),
            Delta::new("source-delta", json!({"title": "missing url"})),
        ]);
        assert_eq!(p.artifact().unwrap().title, "Draft");
        assert!(p.research().sources.is_empty());
        assert!(matches!(
            report.diagnostics.as_slice(),
            [
                Diagnostic::MalformedPayload { index: 1, .. },
                Diagnostic::MalformedPayload { index: 2, .. }
            ]
        ));
    }

    #[test]
    fn test_auxiliary_forwarded_without_mutation() {
        let sink = Arc::new(RecordingSink::new());
        let mut p =
            StreamProcessor::default().with_auxiliary(AuxiliaryRoutes::default(), sink.clone());
        let delta = Delta::new("execution-status", json!({"stdout": "ok"}));
        let report = p.process_new(std::slice::from_ref(&delta));
        assert_eq!(report.forwarded, 1);
        assert!(report.is_clean());
        assert!(p.artifact().is_none());
        assert_eq!(sink.seen(), vec![delta]);
    }

    #[test]
    fn test_finish_persists_document() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut p = StreamProcessor::default().with_store(store.clone());
        p.process_new(&[
            Delta::new("id", "doc_7"),
            Delta::new("title", "Plan"),
            Delta::new("kind", "code"),
            Delta::new("code-delta", "print(1)"),
            Delta::bare("finish"),
            Delta::bare("finish"),
        ]);
        let saved = store.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(
            saved[0],
            DocumentRecord {
                document_id: "doc_7".into(),
                title: "Plan".into(),
                kind: "code".into(),
                content: "print(1)".into(),
            }
        );
    }

    #[test]
    fn test_persist_failure_does_not_corrupt_state() {
        let mut p = StreamProcessor::default().with_store(Arc::new(FailingStore));
        let report = p.process_new(&[
            Delta::new("id", "doc_1"),
            Delta::new("text-delta", "body"),
            Delta::bare("finish"),
        ]);
        assert!(matches!(
            report.diagnostics.as_slice(),
            [Diagnostic::PersistFailed { index: 2, .. }]
        ));
        let artifact = p.artifact().unwrap();
        assert_eq!(artifact.status, ArtifactStatus::Idle);
        assert_eq!(artifact.content, "body");
    }

    #[test]
    fn test_snapshots_are_published() {
        let mut p = StreamProcessor::default();
        let artifact_rx = p.subscribe_artifact();
        let research_rx = p.subscribe_research();

        p.process_new(&[
            Delta::new("text-delta", "hi"),
            Delta::new("progress-init", json!({"maxDepth": 1, "totalSteps": 2})),
        ]);
        assert!(artifact_rx.has_changed().unwrap());
        let snapshot = artifact_rx.borrow().clone();
        assert_eq!(snapshot.unwrap().content, "hi");
        assert_eq!(research_rx.borrow().total_expected_steps, 2);
    }

    #[test]
    fn test_shrunk_log_reported() {
        let mut p = StreamProcessor::default();
        p.process_new(&[
            Delta::new("text-delta", "a"),
            Delta::new("text-delta", "b"),
        ]);
        let report = p.process_new(&[Delta::new("text-delta", "a")]);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::LogShrunk {
                consumed: 2,
                len: 1
            }]
        );
        assert_eq!(p.artifact().unwrap().content, "ab");
    }

    #[test]
    fn test_demux_is_pure_over_parts() {
        let log = vec![Delta::new("title", "T"), Delta::new("text-delta", "x")];
        let (cursor, artifact, research) = demux(
            &log,
            Cursor::new(),
            KindRegistry::builtin(),
            None,
            Arc::new(ResearchState::default()),
        );
        assert_eq!(cursor.consumed(), 2);
        assert_eq!(artifact.unwrap().content, "x");
        assert_eq!(*research, ResearchState::default());
    }
}
