//! Event sinks for run observability.
//!
//! Sinks are passed to the orchestrator explicitly; there is no process-wide
//! sink, so pipelines running side by side report independently.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
