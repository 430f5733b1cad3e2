//! Typed client for the honeypot proxy's proxied, audit and health surfaces.

pub mod client;

pub use client::{
    AuditRequest, AuditResponse, ClientError, DeleteReply, HealthReport, HoneypotClient,
    ProxyReply, RequestFilter, RequestList,
};
