use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::codec::CodecError;

/// Errors surfaced by the chat transport
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error("failed to accept peer connection: {0}")]
    Accept(io::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("transport error: {0}")]
    Transport(io::Error),

    #[error("malformed file header: {0}")]
    Malformed(#[from] CodecError),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("connection is closed")]
    Closed,
}
