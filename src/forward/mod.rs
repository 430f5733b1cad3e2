//! Forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! captured request
//!     → path.rs (hyphen → separator, join with upstream base)
//!     → headers.rs (drop Content-*, Host, hop-by-hop)
//!     → engine.rs (send over shared pool, time it, read body)
//!     → Ok(UpstreamReply) | Err(ForwardFailure)
//! ```

pub mod engine;
pub mod headers;
pub mod path;

pub use engine::{
    build_client, FailureKind, ForwardFailure, ForwardRequest, ForwardingEngine, UpstreamReply,
};
