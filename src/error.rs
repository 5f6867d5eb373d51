// error.rs - Error types for the command runtime
// Every failure inside the registry, importer, watcher and upload adapter is
// expressed as a CommandError so it can be logged and contained at the
// boundary that owns it.

use std::path::PathBuf;
use thiserror::Error;

/// Result type returned by command bodies, mirroring serenity's CommandResult
pub type CommandResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed command definition {path}: {source}")]
    Definition {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown command handler '{0}'")]
    UnknownHandler(String),

    #[error("invalid command: {0}")]
    Invalid(String),

    #[error("command '{command}' requires capability '{capability}' which plugin '{plugin}' does not provide")]
    MissingCapability {
        command: String,
        capability: String,
        plugin: String,
    },

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CommandError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CommandError::Io {
            path: path.into(),
            source,
        }
    }
}
