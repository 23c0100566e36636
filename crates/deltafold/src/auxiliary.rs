//! Pass-through channels for auxiliary subsystems.
//!
//! Auxiliary deltas are recognised by namespace prefix and forwarded verbatim.
//! They never touch artifact or research state.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::warn;

use deltafold_protocol::Delta;

/// Namespace prefix for extension channels.
pub const EXTENSION_PREFIX: &str = "x-";

/// Namespace prefix for the code-execution status channel.
pub const EXECUTION_PREFIX: &str = "execution-";

/// Which tags are auxiliary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxiliaryRoutes {
    prefixes: Vec<String>,
}

impl Default for AuxiliaryRoutes {
    fn default() -> Self {
        Self::new([EXTENSION_PREFIX, EXECUTION_PREFIX])
    }
}

impl AuxiliaryRoutes {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    /// No auxiliary channels at all.
    pub fn none() -> Self {
        Self {
            prefixes: Vec::new(),
        }
    }

    pub fn matches(&self, tag: &str) -> bool {
        self.prefixes.iter().any(|p| tag.starts_with(p.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

/// Receives auxiliary deltas.
pub trait AuxiliarySink: Send + Sync {
    fn forward(&self, delta: &Delta);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl AuxiliarySink for NullSink {
    fn forward(&self, _delta: &Delta) {}
}

/// Forwards into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Delta>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delta>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AuxiliarySink for ChannelSink {
    fn forward(&self, delta: &Delta) {
        if self.tx.send(delta.clone()).is_err() {
            warn!("auxiliary receiver dropped; discarding {}", delta.tag);
        }
    }
}

/// Keeps every forwarded delta in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<Delta>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<Delta> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuxiliarySink for RecordingSink {
    fn forward(&self, delta: &Delta) {
        match self.seen.lock() {
            Ok(mut seen) => seen.push(delta.clone()),
            Err(poisoned) => poisoned.into_inner().push(delta.clone()),
        }
    }
}
