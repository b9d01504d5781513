//! `ExecutionLogSink` implementations: JSONL history, tracing, and fan-out.

mod composite;
mod jsonl;
mod tracing_sink;

pub use composite::CompositeLogSink;
pub use jsonl::{JsonlLogSink, LogRecord};
pub use tracing_sink::TracingLogSink;
