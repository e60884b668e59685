//! x402 facilitator for the Tempo "exact" scheme.
//!
//! Verifies payer-signed Tempo transfer transactions and settles them as fee
//! sponsor. The scheme logic lives in the core [`x402`] crate; this crate
//! provides the HTTP server, environment configuration and logging setup.
//!
//! # Modules
//!
//! - [`routes`]: HTTP endpoints (health, supported, verify, settle, metrics)
//! - [`state`]: Shared [`AppState`](state::AppState)
//! - [`config`]: Environment variables and their defaults
//! - [`metrics`]: Prometheus metrics for verification and settlement
//! - [`logging`]: `tracing-subscriber` setup

pub mod config;
pub mod logging;
pub mod metrics;
pub mod routes;
pub mod state;
