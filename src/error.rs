//! Error types for trace loading and replay

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not valid JSON: {source}", path.display())]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no value provided for variable {0}")]
    MissingVariable(String),

    #[error("failed to start browser session: {0:#}")]
    SessionStart(anyhow::Error),

    #[error("step {position} ({name}) failed: {cause:#}")]
    Step {
        position: usize,
        name: String,
        cause: anyhow::Error,
    },

    #[error("replay worker stopped unexpectedly: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, ReplayError>;
