//! # replay
//!
//! Client runtime for durable, replay-based task execution.
//!
//! Register tasks on a [`RegistryBuilder`], hand the frozen registry to an
//! [`App`], and call [`App::run`]. The app binds its front door, registers
//! its catalogue with the orchestrator, and serves invocation attempts
//! until Ctrl-C.
//!
//! Handlers are replayed from the top on every resumption. Side effects that
//! must not repeat belong inside [`TaskContext::memo`].

#![deny(unsafe_code)]

pub mod app;

pub use app::{App, AppBuilder, AppError, register_until_accepted};

pub use replay_client::{ClientConfig, HttpOrchestratorClient};
pub use replay_core::errors::{self, ErrorDef, StructuredError, Suspended, TaskError};
pub use replay_core::{
    ApiRequest, ApiResponse, OrchestratorClient, Response, SessionId, TaskId, TaskMeta,
    TaskOptions,
};
pub use replay_runtime::{
    ApiError, Dispatcher, Lock, RegistryBuilder, RegistryError, Signal, TaskContext, TaskDef,
    TaskKey, TaskKind, TaskRegistry, Validator,
};
pub use replay_settings::{RuntimeSettings, load_settings, load_settings_from_path};
