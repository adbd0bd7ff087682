//! # replay-runtime
//!
//! Client-side execution of durable, replay-based tasks.
//!
//! - [`TaskContext`]: per-attempt capabilities (memo, signals, locks, remote calls)
//! - [`TaskRegistry`]: immutable catalogue built once at startup
//! - [`Dispatcher`]: runs one attempt and produces exactly one completion
//! - [`api`]: request/response attempts through an axum router
//!
//! Tasks are re-run from the top each time the orchestrator resumes them.
//! Anything that must happen once goes through [`TaskContext::memo`], and
//! a capability returning Suspend should be propagated with `?`.

#![deny(unsafe_code)]

pub mod api;
pub mod channel;
pub mod context;
pub mod dispatcher;
pub mod fault;
pub mod lock;
pub mod memo;
pub mod registry;
pub mod remote;
pub mod signal;
pub mod validator;

pub use api::ApiError;
pub use channel::ClientChannel;
pub use context::TaskContext;
pub use dispatcher::Dispatcher;
pub use lock::Lock;
pub use registry::{RegistryBuilder, RegistryError, TaskDef, TaskKey, TaskKind, TaskRegistry};
pub use remote::{RemoteAgent, RemoteApp, RemoteController, RemoteService};
pub use signal::Signal;
pub use validator::{NoopValidator, Validator};
