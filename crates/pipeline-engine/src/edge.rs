//! Edges: bounded FIFO queues between an output port and an input port
//!
//! An edge is the only state shared between two processes. Producers suspend
//! in [`Edge::push`] while the queue is full and consumers suspend in
//! [`Edge::pop`] while it is empty, which gives the whole graph its
//! backpressure. End of stream travels as the `upstream_complete` flag: once
//! the queue drains, `pop` keeps returning the same terminal `Complete` datum.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use futures_util::future::select_all;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::config::EdgeConfig;
use crate::datum::{Datum, EdgeDatum};
use crate::error::EdgeError;
use crate::port::PortAddr;
use crate::stamp::Stamp;

/// Outcome of waiting for downstream demand on a set of output edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    /// At least one live edge is empty and wants data
    Ready,
    /// Every edge has been marked downstream-complete
    Exhausted,
}

#[derive(Debug, Default)]
struct EdgeState {
    queue: VecDeque<EdgeDatum>,
    upstream_complete: bool,
    downstream_complete: bool,
    last_stamp: Option<Stamp>,
    terminal: Option<EdgeDatum>,
}

impl EdgeState {
    fn terminal(&mut self) -> EdgeDatum {
        let last_stamp = self.last_stamp;
        self.terminal
            .get_or_insert_with(|| {
                let stamp = last_stamp.map(Stamp::increment).unwrap_or_default();
                EdgeDatum::new(Datum::Complete, stamp)
            })
            .clone()
    }

    fn is_ready(&self) -> bool {
        !self.queue.is_empty() || self.upstream_complete || self.downstream_complete
    }
}

/// A queue of stamped datums connecting one output port to one input port
pub struct Edge {
    upstream: PortAddr,
    downstream: PortAddr,
    capacity: usize,
    state: Mutex<EdgeState>,
    changed: Notify,
}

impl Edge {
    /// Create an edge; `capacity == 0` means unbounded
    pub fn new(upstream: PortAddr, downstream: PortAddr, capacity: usize) -> Self {
        Self {
            upstream,
            downstream,
            capacity,
            state: Mutex::new(EdgeState::default()),
            changed: Notify::new(),
        }
    }

    /// Create an edge from an [`EdgeConfig`], falling back to `default_capacity`
    pub fn with_config(
        upstream: PortAddr,
        downstream: PortAddr,
        config: EdgeConfig,
        default_capacity: usize,
    ) -> Self {
        Self::new(upstream, downstream, config.capacity.unwrap_or(default_capacity))
    }

    pub fn upstream(&self) -> &PortAddr {
        &self.upstream
    }

    pub fn downstream(&self) -> &PortAddr {
        &self.downstream
    }

    /// Queue capacity (0 = unbounded)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    pub fn has_data(&self) -> bool {
        !self.is_empty()
    }

    pub fn is_upstream_complete(&self) -> bool {
        self.state.lock().upstream_complete
    }

    pub fn is_downstream_complete(&self) -> bool {
        self.state.lock().downstream_complete
    }

    /// Whether a `pop` would return the terminal marker
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && (state.upstream_complete || state.downstream_complete)
    }

    /// Stamp of the datum at the head of the queue
    pub fn peek_stamp(&self) -> Option<Stamp> {
        self.state.lock().queue.front().map(|d| d.stamp)
    }

    /// Enqueue a datum, suspending while the queue is at capacity
    ///
    /// Pushing `Datum::Complete` marks the edge upstream-complete instead of
    /// queueing a marker. Fails if the consumer has already marked the edge
    /// downstream-complete, or if the stream was already ended.
    pub async fn push(&self, datum: Datum, stamp: Stamp) -> Result<(), EdgeError> {
        if datum.is_complete() {
            self.mark_upstream_complete();
            return Ok(());
        }

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.downstream_complete {
                    return Err(EdgeError::DownstreamComplete(self.to_string()));
                }
                if state.upstream_complete {
                    return Err(EdgeError::UpstreamComplete(self.to_string()));
                }
                if self.capacity == 0 || state.queue.len() < self.capacity {
                    state.queue.push_back(EdgeDatum::new(datum, stamp));
                    drop(state);
                    self.changed.notify_waiters();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Dequeue the next datum, suspending while empty and upstream is live
    ///
    /// Once drained after `mark_upstream_complete` (or after the consumer gave
    /// up with `mark_downstream_complete`), every call returns the same
    /// terminal `Complete` datum.
    pub async fn pop(&self) -> EdgeDatum {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return item;
            }

            notified.await;
        }
    }

    /// Non-blocking `pop`: `None` when empty and upstream is still live
    pub fn try_pop(&self) -> Option<EdgeDatum> {
        let mut state = self.state.lock();
        if let Some(item) = state.queue.pop_front() {
            state.last_stamp = Some(item.stamp);
            drop(state);
            self.changed.notify_waiters();
            return Some(item);
        }
        if state.upstream_complete || state.downstream_complete {
            return Some(state.terminal());
        }
        None
    }

    /// Suspend until `pop` would return without blocking
    pub async fn wait_ready(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state.lock().is_ready() {
                return;
            }

            notified.await;
        }
    }

    /// Producer signals that no more data will be pushed
    pub fn mark_upstream_complete(&self) {
        let mut state = self.state.lock();
        if state.upstream_complete {
            return;
        }
        state.upstream_complete = true;
        drop(state);
        log::trace!("Edge {}: upstream complete", self);
        self.changed.notify_waiters();
    }

    /// Consumer signals it will read no more; queued data is discarded
    pub fn mark_downstream_complete(&self) {
        let mut state = self.state.lock();
        if state.downstream_complete {
            return;
        }
        state.downstream_complete = true;
        state.queue.clear();
        drop(state);
        log::trace!("Edge {}: downstream complete", self);
        self.changed.notify_waiters();
    }

    /// Suspend until one of `edges` needs data, or all of them are finished
    ///
    /// This is the blocking replacement for polling `is_downstream_complete`
    /// and `has_data` in a loop: it resolves as soon as some edge that is not
    /// downstream-complete is empty, and reports `Exhausted` once every edge
    /// is downstream-complete (or `edges` is empty).
    pub async fn wait_for_demand(edges: &[Arc<Edge>]) -> Demand {
        loop {
            let mut waits: Vec<_> = edges
                .iter()
                .map(|edge| Box::pin(edge.changed.notified()))
                .collect();
            for wait in &mut waits {
                wait.as_mut().enable();
            }

            let mut has_incomplete = false;
            for edge in edges {
                let state = edge.state.lock();
                if !state.downstream_complete {
                    has_incomplete = true;
                    if state.queue.is_empty() {
                        return Demand::Ready;
                    }
                }
            }
            if !has_incomplete {
                return Demand::Exhausted;
            }

            select_all(waits).await;
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.upstream, self.downstream)
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Edge")
            .field("upstream", &self.upstream)
            .field("downstream", &self.downstream)
            .field("capacity", &self.capacity)
            .field("queued", &state.queue.len())
            .field("upstream_complete", &state.upstream_complete)
            .field("downstream_complete", &state.downstream_complete)
            .finish()
    }
}
