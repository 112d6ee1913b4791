//! FIFO holding remote candidates until a remote description is installed.

use crate::signaling::IceCandidate;
use std::collections::VecDeque;
use tracing::warn;

/// Candidates held per peer before the oldest are dropped.
pub const MAX_BUFFERED_CANDIDATES: usize = 128;

#[derive(Debug, Default)]
pub struct CandidateBuffer {
    queue: VecDeque<IceCandidate>,
    dropped: usize,
}

impl CandidateBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append in arrival order. Drops the oldest entry when full.
    pub fn push(&mut self, candidate: IceCandidate) {
        if self.queue.len() == MAX_BUFFERED_CANDIDATES {
            self.queue.pop_front();
            self.dropped += 1;
            warn!(
                target: "session.link",
                dropped = self.dropped,
                "Candidate buffer full, dropping oldest candidate"
            );
        }
        self.queue.push_back(candidate);
    }

    /// Take every buffered candidate in arrival order.
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.queue.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
