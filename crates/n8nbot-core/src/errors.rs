use std::{path::PathBuf, time::Duration};

/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the dispatcher can
/// report every failure to the operator the same way.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed: {command} ({})\n{stderr}", exit_label(*code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("command timed out after {}s: {command}", after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("{stage} step failed: {source}")]
    Step {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{source}\n↩️ rollback: {rollback}")]
    UpdateFailed {
        #[source]
        source: Box<Error>,
        rollback: String,
    },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "terminated by signal".to_string(),
    }
}

impl Error {
    /// Name of the pipeline stage that failed, if this error came out of one.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Error::Step { stage, .. } => Some(stage),
            Error::UpdateFailed { source, .. } => source.stage(),
            _ => None,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::Archive(format!("zip error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
