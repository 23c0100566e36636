//! Newline-delimited JSON transport.
//!
//! Reads deltas line by line, appends them to an owned append-only log and
//! lets the processor fold the new suffix after every line. This is the
//! reference transport the CLI uses; other transports only need to keep a
//! growing `&[Delta]` and call [`StreamProcessor::process_new`].

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use deltafold_protocol::Delta;

use crate::error::FeedResult;
use crate::processor::{Diagnostic, ProcessReport, StreamProcessor};

/// Append-only delta log.
#[derive(Debug, Clone, Default)]
pub struct DeltaLog {
    entries: Vec<Delta>,
}

impl DeltaLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: Delta) {
        self.entries.push(delta);
    }

    pub fn as_slice(&self) -> &[Delta] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Totals for one feed run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedSummary {
    /// Lines read, including blank and rejected ones.
    pub lines: usize,
    /// Deltas appended to the log.
    pub accepted: usize,
    /// Lines that were not a delta envelope.
    pub rejected: usize,
    /// Deltas forwarded to the auxiliary sink.
    pub forwarded: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl FeedSummary {
    fn absorb(&mut self, report: ProcessReport) {
        self.forwarded += report.forwarded;
        self.diagnostics.extend(report.diagnostics);
    }
}

/// Feed JSONL deltas from `reader` into `processor` until EOF.
///
/// Lines are read as raw bytes, so a line that is not valid UTF-8 is
/// rejected like any other unparsable line instead of ending the feed.
pub async fn run_jsonl<R>(
    mut reader: R,
    processor: &mut StreamProcessor,
) -> FeedResult<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut log = DeltaLog::new();
    let mut summary = FeedSummary::default();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        summary.lines += 1;
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_slice::<Delta>(line) {
            Ok(delta) => {
                log.push(delta);
                summary.accepted += 1;
            }
            Err(e) => {
                warn!("line {}: not a delta: {e}", summary.lines);
                summary.rejected += 1;
                continue;
            }
        }

        summary.absorb(processor.process_new(log.as_slice()));
    }

    debug!(
        "feed finished: {} lines, {} deltas, {} rejected",
        summary.lines, summary.accepted, summary.rejected
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_jsonl_feed() {
        let input = concat!(
            "{\"type\":\"id\",\"content\":\"doc_1\"}\n",
            "\n",
            "{\"type\":\"text-delta\",\"content\":\"ab\"}\n",
            "not json at all\n",
            "{\"type\":\"text-delta\",\"content\":\"cd\"}\n",
            "{\"type\":\"surprise\"}\n",
        );
        let mut processor = StreamProcessor::default();
        let summary = run_jsonl(BufReader::new(input.as_bytes()), &mut processor)
            .await
            .unwrap();

        assert_eq!(summary.lines, 6);
        assert_eq!(summary.accepted, 4);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.diagnostics.len(), 1);
        assert_eq!(processor.cursor().consumed(), 4);
        assert_eq!(processor.artifact().unwrap().content, "abcd");
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_rejected_not_fatal() {
        let mut input = Vec::new();
        input.extend_from_slice(b"{\"type\":\"text-delta\",\"content\":\"ab\"}\n");
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(b"{\"type\":\"text-delta\",\"content\":\"cd\"}\r\n");
        input.extend_from_slice(b"{\"type\":\"finish\"}");

        let mut processor = StreamProcessor::default();
        let summary = run_jsonl(BufReader::new(input.as_slice()), &mut processor)
            .await
            .unwrap();

        assert_eq!(summary.lines, 4);
        assert_eq!(summary.accepted, 3);
        assert_eq!(summary.rejected, 1);
        let artifact = processor.artifact().unwrap();
        assert_eq!(artifact.content, "abcd");
        assert!(!artifact.is_streaming());
    }

    #[test]
    fn test_delta_log_is_append_only() {
        let mut log = DeltaLog::new();
        assert!(log.is_empty());
        log.push(Delta::bare("finish"));
        log.push(Delta::bare("clear"));
        assert_eq!(log.len(), 2);
        assert_eq!(log.as_slice()[1].tag, "clear");
    }
}
