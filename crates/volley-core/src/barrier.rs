//! Completion barrier: counts submitted tasks against finished ones.
//!
//! Independent of result-channel occupancy. A task counts as finished the
//! moment its worker is done with it, whether or not it produced a payload.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    submitted: usize,
    completed: usize,
}

/// Lets a submitter wait until every submitted task reached a terminal state.
#[derive(Debug, Clone)]
pub struct CompletionBarrier {
    counts: Arc<watch::Sender<Counts>>,
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionBarrier {
    pub fn new() -> Self {
        let (counts, _) = watch::channel(Counts::default());
        Self {
            counts: Arc::new(counts),
        }
    }

    /// Register `n` more tasks.
    pub fn submit(&self, n: usize) {
        self.counts.send_modify(|c| c.submitted += n);
    }

    /// Hand out a guard that marks one task done when dropped.
    pub fn completion(&self) -> Completion {
        Completion {
            barrier: self.clone(),
        }
    }

    /// Mark one task done.
    pub fn done(&self) {
        self.counts.send_modify(|c| {
            if c.completed < c.submitted {
                c.completed += 1;
            } else {
                tracing::warn!(
                    submitted = c.submitted,
                    "Completion signalled for more tasks than were submitted"
                );
            }
        });
    }

    /// Wait until completed == submitted. Returns at once if nothing is pending.
    pub async fn wait(&self) {
        let mut rx = self.counts.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|c| c.completed >= c.submitted).await;
    }

    pub fn submitted(&self) -> usize {
        self.counts.borrow().submitted
    }

    pub fn completed(&self) -> usize {
        self.counts.borrow().completed
    }

    pub fn pending(&self) -> usize {
        let c = *self.counts.borrow();
        c.submitted - c.completed
    }
}

/// Marks exactly one task done on drop.
#[derive(Debug)]
#[must_use = "dropping the guard immediately marks the task done"]
pub struct Completion {
    barrier: CompletionBarrier,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.barrier.done();
    }
}
