//! # replay-client
//!
//! Implementations of [`replay_core::OrchestratorClient`]:
//!
//! - [`HttpOrchestratorClient`]: JSON over HTTP with the session header
//! - `MockOrchestrator`: scripted replies and recorded calls for tests,
//!   behind the `test-util` feature

#![deny(unsafe_code)]

pub mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use http::{ClientConfig, ClientError, HttpOrchestratorClient};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{LOCK_MODULE, MockOrchestrator, MockReply, RecordedCall};
