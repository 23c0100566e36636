//! Read position into the transport's append-only delta log.

use tracing::warn;

/// Tracks how much of an append-only log has been consumed.
///
/// The log is owned by the transport; the cursor only remembers a length.
/// Each entry is handed out exactly once, in order, no matter how often
/// [`Cursor::process_new`] is called with a growing log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    consumed: usize,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries consumed so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Index of the last consumed entry; `None` before anything was read.
    pub fn last_consumed_index(&self) -> Option<usize> {
        self.consumed.checked_sub(1)
    }

    /// Whether `log` is shorter than what was already consumed.
    pub fn is_ahead_of(&self, log_len: usize) -> bool {
        log_len < self.consumed
    }

    /// Return the unread suffix of `log` and advance past it.
    ///
    /// A log that shrank breaks the transport contract: nothing is returned
    /// and the cursor stays where it was.
    pub fn process_new<'a, T>(&mut self, log: &'a [T]) -> &'a [T] {
        if self.is_ahead_of(log.len()) {
            warn!(
                "delta log shrank from {} to {} entries; ignoring",
                self.consumed,
                log.len()
            );
            return &[];
        }
        let fresh = &log[self.consumed..];
        self.consumed = log.len();
        fresh
    }
}
