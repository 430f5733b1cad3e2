//! HTTP surfaces.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing + timeout layers)
//!     → /api/*            proxy.rs    → capture pipeline → response.rs
//!     → /audit/requests   auth.rs     → audit.rs → audit store
//!     → /health           health.rs   → store probe
//! ```

pub mod audit;
pub mod auth;
pub mod health;
pub mod proxy;
pub mod response;
pub mod server;

pub use server::{AppState, HttpServer};
