//! Schedulers drive a set-up pipeline to completion
//!
//! Each process runs its own step loop; edges are the only state shared
//! between loops. A run ends once every process is `Complete` or `Failed`.
//!
//! - [`TaskScheduler`] spawns one tokio task per process.
//! - [`InlineScheduler`] polls every process loop on the calling task,
//!   which keeps runs deterministic in single-threaded tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;

use crate::edge::Edge;
use crate::error::{PipelineError, ProcessFailure, Result};
use crate::events::{EventSink, NullEventSink, PipelineEvent};
use crate::pipeline::Pipeline;
use crate::process::{ProcessNode, ProcessState};

/// Cooperative cancellation for a run
///
/// `abort` marks every edge downstream-complete, which wakes blocked
/// producers and consumers, and makes each process complete at its next
/// step boundary. A step already in progress is never interrupted.
#[derive(Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortState>,
}

#[derive(Default)]
struct AbortState {
    aborted: AtomicBool,
    edges: Mutex<Vec<Arc<Edge>>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        if self.inner.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Pipeline abort requested");
        for edge in self.inner.edges.lock().iter() {
            edge.mark_downstream_complete();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Register the edges of the pipeline about to run
    fn attach(&self, edges: Vec<Arc<Edge>>) {
        let mut guard = self.inner.edges.lock();
        *guard = edges;
        if self.is_aborted() {
            for edge in guard.iter() {
                edge.mark_downstream_complete();
            }
        }
    }
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub execution_id: String,
    /// Final state of every process
    pub states: BTreeMap<String, ProcessState>,
    /// Number of steps each process executed
    pub steps: BTreeMap<String, u64>,
    pub failures: Vec<ProcessFailure>,
    /// Whether the run was cut short by an `AbortHandle`
    pub aborted: bool,
    pub elapsed: Duration,
}

impl RunReport {
    /// True iff no process failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Convert failures into `PipelineError::RunFailed`
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PipelineError::RunFailed(self.failures))
        }
    }
}

/// Drives every process of a set-up pipeline until all are terminal
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run the pipeline once
    ///
    /// Fails before starting anything if the pipeline is not set up or has
    /// already run. Process failures are reported in the returned
    /// [`RunReport`], not as an `Err`.
    async fn run(&self, pipeline: &mut Pipeline) -> Result<RunReport>;

    /// Handle that cancels the current (or next) run
    fn abort_handle(&self) -> AbortHandle;
}

/// Shared state of one run
struct Run {
    execution_id: String,
    events: Arc<dyn EventSink>,
    abort: AbortHandle,
    started: Instant,
}

impl Run {
    fn start(
        pipeline: &mut Pipeline,
        events: Arc<dyn EventSink>,
        abort: AbortHandle,
    ) -> Result<(Self, Vec<ProcessNode>)> {
        let nodes = pipeline.take_processes()?;
        abort.attach(pipeline.edges());

        let run = Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            events,
            abort,
            started: Instant::now(),
        };
        log::info!(
            "Run {} starting with {} processes",
            run.execution_id,
            nodes.len()
        );
        run.emit(PipelineEvent::RunStarted {
            execution_id: run.execution_id.clone(),
            processes: nodes.iter().map(|n| n.name().to_string()).collect(),
        });
        Ok((run, nodes))
    }

    fn emit(&self, event: PipelineEvent) {
        if let Err(err) = self.events.send(event) {
            log::warn!("Run {}: dropping event: {}", self.execution_id, err);
        }
    }

    /// One process's step loop, bracketed by lifecycle events
    async fn drive(&self, node: ProcessNode) -> ProcessNode {
        let process = node.name().to_string();
        self.emit(PipelineEvent::ProcessStarted {
            process: process.clone(),
            execution_id: self.execution_id.clone(),
        });

        let node = node.run(&self.abort).await;

        match node.state() {
            ProcessState::Failed => self.emit(PipelineEvent::ProcessFailed {
                process,
                execution_id: self.execution_id.clone(),
                error: node.failure().unwrap_or_default().to_string(),
            }),
            _ => self.emit(PipelineEvent::ProcessCompleted {
                process,
                execution_id: self.execution_id.clone(),
                steps: node.steps(),
            }),
        }
        node
    }

    fn finish(
        &self,
        pipeline: &mut Pipeline,
        nodes: Vec<ProcessNode>,
        mut lost: Vec<ProcessFailure>,
    ) -> RunReport {
        let states = nodes
            .iter()
            .map(|n| (n.name().to_string(), n.state()))
            .chain(lost.iter().map(|f| (f.process.clone(), ProcessState::Failed)))
            .collect();
        let steps = nodes
            .iter()
            .map(|n| (n.name().to_string(), n.steps()))
            .collect();
        pipeline.restore_processes(nodes);

        let mut failures = pipeline.failures();
        failures.append(&mut lost);
        let elapsed = self.started.elapsed();
        let aborted = self.abort.is_aborted();

        if failures.is_empty() {
            log::info!("Run {} completed in {:?}", self.execution_id, elapsed);
            self.emit(PipelineEvent::RunCompleted {
                execution_id: self.execution_id.clone(),
                aborted,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        } else {
            log::warn!(
                "Run {} finished with {} failed processes",
                self.execution_id,
                failures.len()
            );
            self.emit(PipelineEvent::RunFailed {
                execution_id: self.execution_id.clone(),
                failed: failures.iter().map(|f| f.process.clone()).collect(),
            });
        }

        RunReport {
            execution_id: self.execution_id.clone(),
            states,
            steps,
            failures,
            aborted,
            elapsed,
        }
    }
}

/// Runs each process on its own tokio task
pub struct TaskScheduler {
    events: Arc<dyn EventSink>,
    abort: AbortHandle,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::with_event_sink(Arc::new(NullEventSink))
    }

    pub fn with_event_sink(events: Arc<dyn EventSink>) -> Self {
        Self {
            events,
            abort: AbortHandle::new(),
        }
    }

    /// Run on a freshly built multi-thread runtime, blocking the caller
    ///
    /// Must not be called from inside an async context.
    pub fn run_blocking(&self, pipeline: &mut Pipeline) -> Result<RunReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run(pipeline))
    }
}

#[async_trait]
impl Scheduler for TaskScheduler {
    async fn run(&self, pipeline: &mut Pipeline) -> Result<RunReport> {
        let (run, nodes) = Run::start(pipeline, self.events.clone(), self.abort.clone())?;
        let run = Arc::new(run);

        let handles: Vec<_> = nodes
            .into_iter()
            .map(|node| {
                let name = node.name().to_string();
                let run = run.clone();
                (name, tokio::spawn(async move { run.drive(node).await }))
            })
            .collect();

        let mut finished = Vec::with_capacity(handles.len());
        let mut lost = Vec::new();
        for (name, handle) in handles {
            match handle.await {
                Ok(node) => finished.push(node),
                Err(err) => {
                    log::error!("Process '{}' task ended abnormally: {}", name, err);
                    lost.push(ProcessFailure {
                        process: name,
                        message: err.to_string(),
                    });
                }
            }
        }

        Ok(run.finish(pipeline, finished, lost))
    }

    fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

/// Polls every process loop concurrently on the calling task
pub struct InlineScheduler {
    events: Arc<dyn EventSink>,
    abort: AbortHandle,
}

impl Default for InlineScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl InlineScheduler {
    pub fn new() -> Self {
        Self::with_event_sink(Arc::new(NullEventSink))
    }

    pub fn with_event_sink(events: Arc<dyn EventSink>) -> Self {
        Self {
            events,
            abort: AbortHandle::new(),
        }
    }
}

#[async_trait]
impl Scheduler for InlineScheduler {
    async fn run(&self, pipeline: &mut Pipeline) -> Result<RunReport> {
        let (run, nodes) = Run::start(pipeline, self.events.clone(), self.abort.clone())?;
        let finished = join_all(nodes.into_iter().map(|node| run.drive(node))).await;
        Ok(run.finish(pipeline, finished, Vec::new()))
    }

    fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}
