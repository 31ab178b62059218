//! Pipeline Engine - dataflow execution for independent processing stages
//!
//! This crate runs a directed graph of processes connected by bounded
//! edges. It supports:
//!
//! - Typed ports checked when connections are made
//! - Backpressure through bounded edge queues
//! - Stamp-based alignment of parallel branches
//! - End-of-stream propagation and failure draining
//! - Groups whose ports are remapped onto inner processes
//!
//! # Architecture
//!
//! - `Edge`: FIFO queue between one output and one input; the only state
//!   shared between running processes
//! - `Process`: the plugin trait concrete stages implement
//! - `Pipeline`: assembly, validation (`setup_pipeline`) and topology queries
//! - `Scheduler`: drives every process until it is complete or failed
//! - `EventSink`: generic event streaming for run progress
//!
//! # Example
//!
//! ```ignore
//! use pipeline_engine::{Config, Pipeline, Scheduler, TaskScheduler};
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_process("numbers", Box::new(source), Config::new())?;
//! pipeline.add_process("double", Box::new(scale), Config::new().with("factor", 2))?;
//! pipeline.connect("numbers", "number", "double", "number")?;
//! pipeline.setup_pipeline()?;
//!
//! let report = TaskScheduler::new().run(&mut pipeline).await?;
//! assert!(report.is_success());
//! ```

pub mod builder;
pub mod config;
pub mod datum;
pub mod edge;
pub mod error;
pub mod events;
pub mod groups;
pub mod pipeline;
pub mod port;
pub mod process;
pub mod registry;
pub mod scheduler;
pub mod stamp;
mod validation;

#[cfg(test)]
mod testing;

// Re-export key types
pub use builder::PipelineBuilder;
pub use config::{Config, ConfigKey, EdgeConfig, PipelineConfig};
pub use datum::{Datum, DatumKind, EdgeDatum, Payload};
pub use edge::{Demand, Edge};
pub use error::{
    ConfigError, ConfigFailure, ConnectionError, ConnectionReport, EdgeError, PipelineError,
    ProcessFailure, Result, StepError,
};
pub use events::{ChannelEventSink, EventError, EventSink, NullEventSink, PipelineEvent, VecEventSink};
pub use groups::{Group, PortMapping};
pub use pipeline::{Connection, Pipeline};
pub use port::{PortAddr, PortDirection, PortFlag, PortFlags, PortInfo, PortType};
pub use process::{Process, ProcessDescriptor, ProcessNode, ProcessState, StepContext, StepResult};
pub use registry::{ProcessFactory, ProcessRegistry};
pub use scheduler::{AbortHandle, InlineScheduler, RunReport, Scheduler, TaskScheduler};
pub use stamp::{Stamp, StampOrdering};
