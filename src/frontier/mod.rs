use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::Notify;

use crate::detector::ProbeError;

#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("frontier {0} lock poisoned")]
    Poisoned(&'static str),
}

impl From<FrontierError> for ProbeError {
    fn from(err: FrontierError) -> Self {
        ProbeError::Fatal(err.to_string())
    }
}

/// Shared work queue plus visited set for one scan.
///
/// `outstanding` counts items that were pushed but not yet acknowledged with
/// [`Frontier::task_done`]; the frontier is drained once the queue is empty and
/// that count reaches zero.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: Mutex<VecDeque<String>>,
    visited: Mutex<HashSet<String>>,
    outstanding: AtomicUsize,
    notify: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> Result<MutexGuard<'_, VecDeque<String>>, FrontierError> {
        self.queue.lock().map_err(|_| FrontierError::Poisoned("queue"))
    }

    fn visited(&self) -> Result<MutexGuard<'_, HashSet<String>>, FrontierError> {
        self.visited
            .lock()
            .map_err(|_| FrontierError::Poisoned("visited"))
    }

    /// Enqueues `url` unless it was already visited. Returns whether it was queued.
    pub fn push(&self, url: impl Into<String>) -> Result<bool, FrontierError> {
        let url = url.into();
        if self.visited()?.contains(&url) {
            return Ok(false);
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.queue()?.push_back(url);
        self.notify.notify_waiters();
        Ok(true)
    }

    pub fn extend<I, S>(&self, urls: I) -> Result<usize, FrontierError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queued = 0;
        for url in urls {
            if self.push(url)? {
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// Next queued item, waiting while other workers may still add more.
    /// `None` once the queue is empty and every popped item was acknowledged.
    pub async fn next(&self) -> Result<Option<String>, FrontierError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before checking so a push between check and await is not lost
            notified.as_mut().enable();

            let popped = self.queue()?.pop_front();
            if let Some(url) = popped {
                return Ok(Some(url));
            }
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return Ok(None);
            }
            notified.await;
        }
    }

    /// Atomic check-and-insert; false when another worker got there first.
    pub fn mark_visited(&self, url: &str) -> Result<bool, FrontierError> {
        Ok(self.visited()?.insert(url.to_string()))
    }

    pub fn is_visited(&self, url: &str) -> Result<bool, FrontierError> {
        Ok(self.visited()?.contains(url))
    }

    pub fn task_done(&self) {
        let previous = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous <= 1 {
            self.notify.notify_waiters();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn visited_count(&self) -> Result<usize, FrontierError> {
        Ok(self.visited()?.len())
    }
}
