use std::io;

use thiserror::Error;

/// Errors raised while binding or running the front door.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding a requested address failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was tried.
        addr: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Every randomly chosen port in the range was taken.
    #[error("no free port in {start}..={end} after {attempts} attempts")]
    NoFreePort {
        /// First port of the range.
        start: u16,
        /// Last port of the range.
        end: u16,
        /// Attempts made.
        attempts: u32,
    },

    /// The server stopped with an I/O error.
    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}
