use std::collections::VecDeque;

use tracing::debug;

use crate::ports::PortError;

/// Commands held back until the page context can run them.
///
/// `flush` takes `&mut self`, so a flush can never start another one; the
/// executor only sees the snapshot it was handed. Executed items are never
/// replayed.
#[derive(Debug)]
pub struct ScriptQueue<T> {
    items: VecDeque<T>,
}

impl<T> Default for ScriptQueue<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> ScriptQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Runs queued items in FIFO order and returns how many executed.
    ///
    /// On executor failure the failed item and everything after it stay
    /// queued, in order, and the error is returned.
    pub fn flush<F>(&mut self, mut execute: F) -> Result<usize, PortError>
    where
        F: FnMut(&T) -> Result<(), PortError>,
    {
        let mut batch = std::mem::take(&mut self.items);
        let mut executed = 0usize;
        let mut failure = None;

        while let Some(item) = batch.front() {
            if let Err(e) = execute(item) {
                failure = Some(e);
                break;
            }
            batch.pop_front();
            executed += 1;
        }

        if failure.is_some() {
            self.items = batch;
        }
        debug!(executed, remaining = self.items.len(), "script queue flushed");

        match failure {
            Some(e) => Err(e),
            None => Ok(executed),
        }
    }
}
