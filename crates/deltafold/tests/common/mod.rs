//! Test utilities for building delta logs.

#![allow(dead_code)]

use serde_json::{Value, json};

use deltafold::Delta;

pub fn text(chunk: &str) -> Delta {
    Delta::new("text-delta", chunk)
}

pub fn activity(message: &str, completed: u32, total: u32) -> Delta {
    Delta::new(
        "activity-delta",
        json!({
            "type": "search",
            "status": "complete",
            "message": message,
            "timestamp": 1_700_000_000_000_i64,
            "completedSteps": completed,
            "totalSteps": total,
        }),
    )
}

pub fn progress_init(max_depth: u32, total_steps: u32) -> Delta {
    Delta::new(
        "progress-init",
        json!({"maxDepth": max_depth, "totalSteps": total_steps}),
    )
}

pub fn source(url: &str) -> Delta {
    Delta::new(
        "source-delta",
        json!({"url": url, "title": url, "relevance": 0.5}),
    )
}

/// A complete artifact turn: id, title, kind, clear, content chunks, finish.
pub fn document_turn(id: &str, kind: &str, content_tag: &str, chunks: &[&str]) -> Vec<Delta> {
    let mut log = vec![
        Delta::new("id", id),
        Delta::new("title", format!("Document {id}")),
        Delta::new("kind", kind),
        Delta::bare("clear"),
    ];
    log.extend(chunks.iter().map(|chunk| Delta::new(content_tag, *chunk)));
    log.push(Delta::bare("finish"));
    log
}

/// A mixed log touching every domain.
pub fn mixed_log() -> Vec<Delta> {
    let mut log = vec![progress_init(2, 3)];
    log.extend(document_turn("doc_1", "text", "text-delta", &["Hello", ", ", "world"]));
    log.push(activity("searching", 1, 3));
    log.push(Delta::new("x-telemetry", json!({"tokens": 12})));
    log.push(source("https://example.com/a"));
    log.push(Delta::new("depth-delta", json!({"current": 1, "max": 2})));
    log.push(Delta::new("mystery", Value::Null));
    log.push(activity("reading", 2, 3));
    log.push(Delta::bare("complete"));
    log
}
