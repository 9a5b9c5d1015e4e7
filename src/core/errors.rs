//! Classified error kinds.
//!
//! Most operations return `anyhow::Result`; the kinds below are the ones a
//! caller (or the CLI exit code) needs to tell apart. They travel inside the
//! `anyhow::Error` chain and are recovered with [`ZappError::find`].

use std::path::PathBuf;

use thiserror::Error;

/// Exit code used when a reserved archive name is already declared.
pub const EXIT_COLLISION: i32 = 1;

/// Exit code used for every other fatal condition.
pub const EXIT_FAILURE: i32 = 2;

#[derive(Debug, Error)]
pub enum ZappError {
    /// A prelude or entry reference is not a dotted identifier path.
    #[error("invalid {part} reference `{reference}`")]
    InvalidReference {
        reference: String,
        part: &'static str,
    },

    /// A synthesized archive member is already declared by the user.
    #[error("`{path}` conflicts with a generated archive member")]
    Collision { path: String },

    /// An unpacked wheel tree lacks one of its required documents.
    #[error("wheel at `{}` is missing its {document} document", wheel.display())]
    MissingMetadata {
        wheel: PathBuf,
        document: &'static str,
    },

    /// A metadata document could be read but not understood.
    #[error("malformed {document}: {message}")]
    MalformedMetadata {
        document: &'static str,
        message: String,
    },

    #[error("invalid compatibility tag `{tag}`")]
    InvalidTag { tag: String },

    #[error("invalid wheel name `{name}`")]
    InvalidWheelName { name: String },

    #[error("invalid archive destination `{path}`")]
    InvalidDestination { path: String },

    #[error("destinations `{first}` and `{second}` both normalize to `{normalized}`")]
    DuplicateDestination {
        first: String,
        second: String,
        normalized: String,
    },

    #[error("prelude `{reference}` exited with {status}")]
    PreludeFailed { reference: String, status: String },
}

impl ZappError {
    /// Process exit code for this kind of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ZappError::Collision { .. } => EXIT_COLLISION,
            _ => EXIT_FAILURE,
        }
    }

    /// Find the first classified error in an `anyhow` chain.
    pub fn find(err: &anyhow::Error) -> Option<&ZappError> {
        err.chain().find_map(|cause| cause.downcast_ref::<ZappError>())
    }
}

/// Exit code for an arbitrary error returned by an operation.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    ZappError::find(err).map_or(EXIT_FAILURE, ZappError::exit_code)
}
