use std::process::ExitStatus;

use thiserror::Error;

use crate::frame::FrameError;

/// Errors surfaced by schema reads and table reads.
#[derive(Error, Debug)]
pub enum MdbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    ProcessFailure {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("output of `{program}` is not valid {encoding}")]
    Decode {
        program: String,
        encoding: &'static str,
    },

    #[error("unsupported encoding `{0}`")]
    UnsupportedEncoding(String),

    #[error("table `{0}` not found in schema")]
    TableNotFound(String),

    /// An integer column holds missing values; the message carries the promote hint.
    #[error("{message}")]
    IntegerNullValue { message: String },

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error(transparent)]
    Frame(FrameError),
}

/// Alias for fallible operations in this crate
pub type MdbResult<T> = Result<T, MdbError>;

impl From<FrameError> for MdbError {
    /// Integer columns with missing values get the promote hint appended;
    /// everything else passes through unchanged.
    fn from(err: FrameError) -> Self {
        match err {
            err @ FrameError::IntegerNulls { .. } => {
                let text = err.to_string();
                let last = text.lines().last().unwrap_or_default();
                MdbError::IntegerNullValue {
                    message: [
                        last,
                        "Consider passing promote='nullable_int_to_float' or",
                        "passing promote='int_to_float' to read_table",
                    ]
                    .join("\n"),
                }
            }
            other => MdbError::Frame(other),
        }
    }
}
