//! Listener binding.
//!
//! A fixed port is bound as given. Without one, ports are drawn at random
//! from the configured range until one binds or the attempt budget runs out.

use std::net::TcpListener as StdListener;

use rand::Rng;
use tokio::net::TcpListener;
use tracing::debug;

use crate::errors::ServerError;

/// Where the front door should listen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortPolicy {
    /// Interface to bind.
    pub host: String,
    /// Exact port, skipping the random search.
    pub fixed: Option<u16>,
    /// First port of the search range.
    pub range_start: u16,
    /// Last port of the search range (inclusive).
    pub range_end: u16,
    /// Random draws before giving up.
    pub attempts: u32,
}

impl Default for PortPolicy {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            fixed: None,
            range_start: 7001,
            range_end: 7999,
            attempts: 300,
        }
    }
}

/// Bind a listener according to `policy`. Must be called inside a tokio
/// runtime.
pub fn bind_listener(policy: &PortPolicy) -> Result<TcpListener, ServerError> {
    if let Some(port) = policy.fixed {
        return bind(&policy.host, port).map_err(|source| ServerError::Bind {
            addr: format!("{}:{port}", policy.host),
            source,
        });
    }

    let mut rng = rand::rng();
    for _ in 0..policy.attempts {
        let port = rng.random_range(policy.range_start..=policy.range_end);
        match bind(&policy.host, port) {
            Ok(listener) => return Ok(listener),
            Err(e) => debug!(port, error = %e, "port unavailable"),
        }
    }
    Err(ServerError::NoFreePort {
        start: policy.range_start,
        end: policy.range_end,
        attempts: policy.attempts,
    })
}

fn bind(host: &str, port: u16) -> std::io::Result<TcpListener> {
    let listener = StdListener::bind((host, port))?;
    listener.set_nonblocking(true)?;
    TcpListener::from_std(listener)
}
