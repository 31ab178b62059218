//! End-to-end runs of the built-in processes

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline_engine::{
    Config, ConnectionError, Datum, EdgeConfig, Group, InlineScheduler, Pipeline, PipelineBuilder,
    PipelineError, PortAddr, PortFlags, PortInfo, PortType, Process, ProcessDescriptor,
    ProcessState, Scheduler, StepContext, StepError, StepResult, TaskScheduler,
};

use crate::{
    builtin_registry, Blend, Collector, CollectorHandle, ColorSource, Discard, NumberSource, Scale,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn numbers(count: u64) -> Config {
    Config::new().with("count", count)
}

/// Passes numbers through, recording the deepest queue it ever saw
#[derive(Clone, Default)]
struct QueueDepth {
    max_len: Arc<Mutex<usize>>,
}

#[async_trait]
impl Process for QueueDepth {
    fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor::new("queue-depth", "Records input queue depth")
            .with_input(PortInfo::input("in", PortType::named("number"), "").required())
            .with_output(PortInfo::output("out", PortType::named("number"), ""))
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        if let Some(edge) = ctx.input_edge("in") {
            let mut max_len = self.max_len.lock();
            *max_len = (*max_len).max(edge.len());
        }
        let datum = ctx.grab("in").await?;
        ctx.push("out", datum).await?;
        Ok(StepResult::Continue)
    }
}

/// Drops the first datum it receives and forwards the rest
#[derive(Default)]
struct SkipFirst {
    skipped: bool,
}

#[async_trait]
impl Process for SkipFirst {
    fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor::new("skip-first", "Drops the first datum")
            .with_input(PortInfo::input("in", PortType::named("number"), "").required())
            .with_output(PortInfo::output("out", PortType::named("number"), ""))
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        let datum = ctx.grab("in").await?;
        if !self.skipped {
            self.skipped = true;
            return Ok(StepResult::Continue);
        }
        ctx.push("out", datum).await?;
        Ok(StepResult::Continue)
    }
}

/// Fails on the third value
#[derive(Default)]
struct FailOnThird {
    seen: u32,
}

#[async_trait]
impl Process for FailOnThird {
    fn descriptor(&self) -> ProcessDescriptor {
        ProcessDescriptor::new("fail-on-third", "Fails partway through")
            .with_input(PortInfo::input("in", PortType::named("number"), "").required())
            .with_output(PortInfo::output("out", PortType::named("number"), ""))
    }

    async fn step(&mut self, ctx: &mut StepContext) -> Result<StepResult, StepError> {
        let datum = ctx.grab("in").await?;
        self.seen += 1;
        if self.seen == 3 {
            return Err(StepError::failed("third value rejected"));
        }
        ctx.push("out", datum).await?;
        Ok(StepResult::Continue)
    }
}

fn scaled_chain(count: u64, factor: f64) -> (Pipeline, CollectorHandle) {
    let (collector, handle) = Collector::with_handle();
    let mut pipeline = Pipeline::new();
    pipeline
        .add_process("numbers", Box::new(NumberSource::new()), numbers(count))
        .unwrap();
    pipeline
        .add_process("scale", Box::new(Scale::new()), Config::new().with("factor", factor))
        .unwrap();
    pipeline
        .add_process("sink", Box::new(collector), Config::new())
        .unwrap();
    pipeline.connect("numbers", "number", "scale", "number").unwrap();
    pipeline.connect("scale", "number", "sink", "value").unwrap();
    pipeline.setup_pipeline().unwrap();
    (pipeline, handle)
}

#[tokio::test]
async fn test_scaled_chain() {
    init_logging();
    let (mut pipeline, sink) = scaled_chain(5, 2.0);

    let report = TaskScheduler::new().run(&mut pipeline).await.unwrap();

    assert!(report.is_success());
    assert_eq!(sink.values::<f64>(), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    assert!(sink.is_complete());
    assert!(report.states.values().all(|s| *s == ProcessState::Complete));
}

#[test]
fn test_step_counts() {
    let (mut pipeline, _sink) = scaled_chain(3, 1.0);

    let report = tokio_test::block_on(InlineScheduler::new().run(&mut pipeline)).unwrap();

    // Three pushes plus the step that reports completion
    assert_eq!(report.steps["numbers"], 4);
    // Consumers finish on a drained input without another step
    assert_eq!(report.steps["scale"], 3);
    assert_eq!(report.steps["sink"], 3);
}

#[tokio::test]
async fn test_backpressure_bounds_queue() {
    let depth = QueueDepth::default();
    let max_len = depth.max_len.clone();
    let (collector, sink) = Collector::with_handle();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_process("numbers", Box::new(NumberSource::new()), numbers(50))
        .unwrap();
    pipeline
        .add_process("depth", Box::new(depth), Config::new())
        .unwrap();
    pipeline
        .add_process("sink", Box::new(collector), Config::new())
        .unwrap();
    pipeline
        .connect_with("numbers", "number", "depth", "in", EdgeConfig::with_capacity(1))
        .unwrap();
    pipeline.connect("depth", "out", "sink", "value").unwrap();
    pipeline.setup_pipeline().unwrap();

    let report = TaskScheduler::new().run(&mut pipeline).await.unwrap();

    assert!(report.is_success());
    assert_eq!(sink.len(), 50);
    assert!(*max_len.lock() <= 1);
}

#[test]
fn test_unconnected_required_input() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_process("A", Box::new(NumberSource::new()), Config::new())
        .unwrap();
    pipeline
        .add_process("B", Box::new(Discard::new()), Config::new())
        .unwrap();

    match pipeline.setup_pipeline() {
        Err(PipelineError::Connection(report)) => {
            assert!(report.contains(&ConnectionError::MissingRequiredInput(PortAddr::new(
                "B", "input"
            ))));
        }
        other => panic!("expected a connection error, got {:?}", other.map(|_| ())),
    }
    assert!(!pipeline.is_setup());
}

#[tokio::test]
async fn test_group_matches_direct_wiring() {
    let (collector, sink) = Collector::with_handle();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_process("numbers", Box::new(NumberSource::new()), numbers(5))
        .unwrap();
    pipeline
        .add_process("scale", Box::new(Scale::new()), Config::new().with("factor", 2))
        .unwrap();
    pipeline
        .add_process("sink", Box::new(collector), Config::new())
        .unwrap();
    pipeline
        .add_group(Group::new("doubler").with_description("Doubles numbers"))
        .unwrap();
    pipeline
        .map_input_port("doubler", "in", "scale", "number", PortFlags::new())
        .unwrap();
    pipeline
        .map_output_port("doubler", "out", "scale", "number", PortFlags::new())
        .unwrap();
    pipeline.connect("numbers", "number", "doubler", "in").unwrap();
    pipeline.connect("doubler", "out", "sink", "value").unwrap();
    pipeline.setup_pipeline().unwrap();

    assert_eq!(
        pipeline.mapped_group_input_ports("doubler", "in"),
        vec![PortAddr::new("scale", "number")]
    );
    assert_eq!(
        pipeline.upstream_for_port("sink", "value"),
        Some("scale".to_string())
    );

    let report = TaskScheduler::new().run(&mut pipeline).await.unwrap();
    assert!(report.is_success());

    let (mut direct, direct_sink) = scaled_chain(5, 2.0);
    TaskScheduler::new().run(&mut direct).await.unwrap();
    assert_eq!(sink.values::<f64>(), direct_sink.values::<f64>());
}

#[tokio::test]
async fn test_failure_drains_graph() {
    init_logging();
    let (collector, sink) = Collector::with_handle();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_process("numbers", Box::new(NumberSource::new()), numbers(1000))
        .unwrap();
    pipeline
        .add_process("faulty", Box::new(FailOnThird::default()), Config::new())
        .unwrap();
    pipeline
        .add_process("sink", Box::new(collector), Config::new())
        .unwrap();
    pipeline.connect("numbers", "number", "faulty", "in").unwrap();
    pipeline.connect("faulty", "out", "sink", "value").unwrap();
    pipeline.setup_pipeline().unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        TaskScheduler::new().run(&mut pipeline),
    )
    .await
    .expect("a failed process must not stall the run")
    .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].process, "faulty");
    assert_eq!(report.states["faulty"], ProcessState::Failed);
    assert_eq!(report.states["numbers"], ProcessState::Complete);
    assert_eq!(report.states["sink"], ProcessState::Complete);
    assert_eq!(sink.values::<f64>(), vec![0.0, 1.0]);
    assert_eq!(
        pipeline.process_state("faulty"),
        Some(ProcessState::Failed)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abort_endless_color_source() {
    let (collector, sink) = Collector::with_handle();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_process("color", Box::new(ColorSource::new()), Config::new())
        .unwrap();
    pipeline
        .add_process("sink", Box::new(collector), Config::new())
        .unwrap();
    pipeline.connect("color", "color", "sink", "value").unwrap();
    pipeline.setup_pipeline().unwrap();

    let scheduler = TaskScheduler::new();
    let abort = scheduler.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        abort.abort();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), scheduler.run(&mut pipeline))
        .await
        .expect("abort should end the run")
        .unwrap();

    assert!(report.aborted);
    assert!(report.is_success());
    assert!(sink.is_complete());
    assert!(report.states.values().all(|s| *s == ProcessState::Complete));
}

#[tokio::test]
async fn test_color_source_stamps_increase() {
    let (collector, sink) = Collector::with_handle();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_process("color", Box::new(ColorSource::new()), Config::new())
        .unwrap();
    pipeline
        .add_process("sink", Box::new(collector), Config::new().with("limit", 3))
        .unwrap();
    pipeline.connect("color", "color", "sink", "value").unwrap();
    pipeline.setup_pipeline().unwrap();

    let report = TaskScheduler::new().run(&mut pipeline).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.states["color"], ProcessState::Complete);
    assert_eq!(sink.len(), 3);
    assert!(sink.datums().iter().all(|d| matches!(d, Datum::Empty)));

    let stamps = sink.stamps();
    assert!(stamps.windows(2).all(|w| w[0].index() < w[1].index()));
    assert!(stamps.windows(2).all(|w| w[0].is_comparable_with(&w[1])));
}

fn blend_pipeline(right: Box<dyn Process>) -> (Pipeline, CollectorHandle) {
    let (collector, sink) = Collector::with_handle();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_process("numbers", Box::new(NumberSource::new()), numbers(3))
        .unwrap();
    pipeline
        .add_process("right", right, Config::new().with("factor", 4))
        .unwrap();
    pipeline
        .add_process("blend", Box::new(Blend::new()), Config::new())
        .unwrap();
    pipeline
        .add_process("sink", Box::new(collector), Config::new())
        .unwrap();
    pipeline.connect("numbers", "number", "blend", "left").unwrap();
    pipeline.connect("numbers", "number", "right", "number").unwrap();
    pipeline.connect("right", "number", "blend", "right").unwrap();
    pipeline.connect("blend", "blended", "sink", "value").unwrap();
    pipeline.setup_pipeline().unwrap();
    (pipeline, sink)
}

#[tokio::test]
async fn test_blend_fan_out() {
    let (mut pipeline, sink) = blend_pipeline(Box::new(Scale::new()));

    let report = TaskScheduler::new().run(&mut pipeline).await.unwrap();

    assert!(report.is_success());
    assert_eq!(sink.values::<f64>(), vec![0.0, 2.5, 5.0]);
    assert_eq!(pipeline.downstream_for_process("numbers"), vec!["blend", "right"]);
}

#[tokio::test]
async fn test_blend_drops_skewed_data() {
    let (collector, sink) = Collector::with_handle();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_process("numbers", Box::new(NumberSource::new()), numbers(3))
        .unwrap();
    pipeline
        .add_process("skip", Box::new(SkipFirst::default()), Config::new())
        .unwrap();
    pipeline
        .add_process("blend", Box::new(Blend::new()), Config::new())
        .unwrap();
    pipeline
        .add_process("sink", Box::new(collector), Config::new())
        .unwrap();
    pipeline.connect("numbers", "number", "blend", "left").unwrap();
    pipeline.connect("numbers", "number", "skip", "in").unwrap();
    pipeline.connect("skip", "out", "blend", "right").unwrap();
    pipeline.connect("blend", "blended", "sink", "value").unwrap();
    pipeline.setup_pipeline().unwrap();

    let report = TaskScheduler::new().run(&mut pipeline).await.unwrap();

    assert!(report.is_success());
    // Value 0 on the left has no partner and is dropped
    assert_eq!(sink.values::<f64>(), vec![1.0, 2.0]);
}

#[tokio::test]
async fn test_blend_unrelated_sources_fail() {
    let (collector, _sink) = Collector::with_handle();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_process("a", Box::new(NumberSource::new()), numbers(3))
        .unwrap();
    pipeline
        .add_process("b", Box::new(NumberSource::new()), numbers(3))
        .unwrap();
    pipeline
        .add_process("blend", Box::new(Blend::new()), Config::new())
        .unwrap();
    pipeline
        .add_process("sink", Box::new(collector), Config::new())
        .unwrap();
    pipeline.connect("a", "number", "blend", "left").unwrap();
    pipeline.connect("b", "number", "blend", "right").unwrap();
    pipeline.connect("blend", "blended", "sink", "value").unwrap();
    pipeline.setup_pipeline().unwrap();

    let report = TaskScheduler::new().run(&mut pipeline).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].process, "blend");
    assert!(report.failures[0].message.contains("unrelated streams"));
    assert_eq!(report.states["sink"], ProcessState::Complete);
}

#[test]
fn test_invalid_alpha_fails_setup() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_process("numbers", Box::new(NumberSource::new()), Config::new())
        .unwrap();
    pipeline
        .add_process("blend", Box::new(Blend::new()), Config::new().with("right_alpha", 2))
        .unwrap();
    pipeline
        .add_process("sink", Box::new(Discard::new()), Config::new())
        .unwrap();
    pipeline.connect("numbers", "number", "blend", "left").unwrap();
    pipeline.connect("numbers", "number", "blend", "right").unwrap();
    pipeline.connect("blend", "blended", "sink", "input").unwrap();

    match pipeline.setup_pipeline() {
        Err(PipelineError::Configuration(failures)) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].process, "blend");
        }
        other => panic!("expected a configuration error, got {:?}", other.map(|_| ())),
    }
    assert_eq!(pipeline.process_state("blend"), Some(ProcessState::Failed));
}

#[test]
fn test_registry_built_pipeline() {
    let registry = builtin_registry();
    let mut pipeline = PipelineBuilder::new()
        .with_registry(&registry)
        .add("numbers", "number-source", numbers(4))
        .add("scale", "scale", Config::new().with("factor", -1))
        .add("drop", "discard", Config::new())
        .connect("numbers", "number", "scale", "number")
        .connect("scale", "number", "drop", "input")
        .build_and_setup()
        .unwrap();

    assert_eq!(pipeline.execution_order(), vec!["numbers", "scale", "drop"]);

    let report = TaskScheduler::new().run_blocking(&mut pipeline).unwrap();
    assert!(report.is_success());
    assert_eq!(report.steps["drop"], 4);
}

#[test]
fn test_registry_unknown_type() {
    let registry = builtin_registry();
    let result = PipelineBuilder::new()
        .with_registry(&registry)
        .add("reader", "image-reader", Config::new())
        .build();
    assert!(matches!(result, Err(PipelineError::UnknownProcessType(t)) if t == "image-reader"));
}
