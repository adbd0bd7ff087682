//! # replay-server
//!
//! HTTP front door that receives invocation attempts from the orchestrator
//! and hands them to a [`Dispatcher`](replay_runtime::Dispatcher).
//!
//! - [`server`]: axum routes and graceful serving
//! - [`port`]: listener binding, with random port reservation

#![deny(unsafe_code)]

pub mod errors;
pub mod port;
pub mod server;

pub use errors::ServerError;
pub use port::{PortPolicy, bind_listener};
pub use server::{AppState, build_router, paths, serve};
