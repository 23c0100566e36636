//! Deep-research progress reducer.
//!
//! Independent of the artifact reducer. The completion latch is stored here
//! but enforced by the processor, which drops research deltas while it is set.

use std::sync::Arc;

use tracing::{debug, info, warn};

use deltafold_protocol::{ResearchDelta, ResearchState};

/// Fold one research delta.
///
/// `progress-init` starts a new turn from scratch (no merge with the old
/// one). Counters are last-write-wins. `warning` is a log-only event and
/// returns the same `Arc`.
pub fn apply(state: &Arc<ResearchState>, delta: &ResearchDelta) -> Arc<ResearchState> {
    match delta {
        ResearchDelta::ProgressInit {
            max_depth,
            total_steps,
        } => {
            debug!("research turn started: depth {max_depth}, {total_steps} steps");
            Arc::new(ResearchState::new_turn(*max_depth, *total_steps))
        }
        ResearchDelta::Depth { current, max } => {
            let mut next = (**state).clone();
            next.current_depth = *current;
            next.max_depth = *max;
            Arc::new(next)
        }
        ResearchDelta::Activity(update) => {
            let mut next = (**state).clone();
            next.activity.push(update.item.clone());
            if let Some(completed) = update.completed_steps {
                next.completed_steps = completed;
            }
            if let Some(total) = update.total_steps {
                next.total_expected_steps = total;
            }
            Arc::new(next)
        }
        ResearchDelta::Source(source) => {
            let mut next = (**state).clone();
            next.sources.push(source.clone());
            Arc::new(next)
        }
        ResearchDelta::Warning(message) => {
            warn!("research warning: {message}");
            Arc::clone(state)
        }
        ResearchDelta::Complete => {
            info!(
                "research complete: {} activities, {} sources",
                state.activity.len(),
                state.sources.len()
            );
            let mut next = (**state).clone();
            next.completed = true;
            Arc::new(next)
        }
        ResearchDelta::Error(message) => {
            warn!(
                "research failed: {}",
                message.as_deref().unwrap_or("no reason given")
            );
            let mut next = (**state).clone();
            next.completed = true;
            next.error = message.clone();
            Arc::new(next)
        }
    }
}
