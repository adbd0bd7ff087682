//! # replay-core
//!
//! Shared vocabulary of the replay runtime.
//!
//! - [`ids`]: branded session and task identifiers
//! - [`errors`]: the structured error shape, its stable catalogue, and [`TaskError`]
//! - [`response`]: the success/error [`Response`] handed back by capability calls
//! - [`events`]: attempt start and completion events exchanged with the orchestrator
//! - [`protocol`]: request/response bodies for every orchestrator endpoint
//! - [`client`]: the [`OrchestratorClient`] boundary trait
//! - [`logging`]: tracing subscriber setup

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod response;

pub use client::OrchestratorClient;
pub use errors::{ErrorDef, StructuredError, Suspended, TaskError};
pub use events::{
    ApiCompleteEvent, ApiRequest, ApiResponse, ApiStartEvent, AttemptOutcome,
    ServiceCompleteEvent, ServiceStartEvent, Stacktrace, TaskMeta, TaskOptions,
};
pub use ids::{SessionId, TaskId};
pub use response::Response;
