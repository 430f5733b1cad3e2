//! Capture subsystem: the capture–forward–correlate pipeline.
//!
//! # Design Decisions
//! - The request id comes back from the insert and lives only in the call's
//!   `CorrelationContext`; it is never looked up again
//! - Forwarding failures still produce a response record (status 500)
//! - Each call shares the store and the upstream pool, nothing else

pub mod correlation;
pub mod pipeline;

pub use correlation::CorrelationContext;
pub use pipeline::{CapturePipeline, InboundCall, PipelineError, ProxyOutcome};
