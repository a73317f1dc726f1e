//! CPI error taxonomy.
//!
//! Every action failure is a [`CpiError`]: a kind from the BOSH error
//! taxonomy plus a message naming the operation and identifiers involved.
//! Collaborator errors are folded into a `CpiError` with
//! [`ResultExt::cloud_context`], which picks the kind via [`Classify`].

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_cpi_id::IdError;

use crate::backend::BackendError;
use crate::disk::DiskError;
use crate::stemcell::StemcellError;

/// Error kinds reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Transient failure; the orchestrator may resend the request.
    #[serde(rename = "Bosh::Clouds::RetryableError")]
    Retryable,

    /// Unknown action or argument shape. Never retried.
    #[serde(rename = "Bosh::Clouds::NotSupported")]
    NotSupported,

    /// The backend could not be reached.
    #[serde(rename = "Bosh::Clouds::CloudServiceUnavailable")]
    CloudServiceUnavailable,

    /// Anything else.
    #[serde(rename = "Bosh::Clouds::CloudError")]
    Generic,
}

impl ErrorKind {
    /// Whether the orchestrator may safely resend the same request.
    pub fn ok_to_retry(self) -> bool {
        matches!(
            self,
            ErrorKind::Retryable | ErrorKind::CloudServiceUnavailable
        )
    }
}

/// Error returned by an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CpiError {
    kind: ErrorKind,
    message: String,
}

impl CpiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, message)
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Retryable, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn ok_to_retry(&self) -> bool {
        self.kind.ok_to_retry()
    }
}

/// Maps a collaborator error onto an [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Generic
    }
}

impl Classify for BackendError {
    fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Unavailable(_) => ErrorKind::CloudServiceUnavailable,
            BackendError::NotFound(_) | BackendError::Failed(_) => ErrorKind::Generic,
        }
    }
}

impl Classify for StemcellError {}

impl Classify for DiskError {}

impl Classify for IdError {}

impl Classify for CpiError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Attach operation context to collaborator errors.
pub trait ResultExt<T> {
    /// Wrap the error as `"{context}: {error}"`, keeping its classification.
    fn cloud_context<C: Display>(self, context: C) -> Result<T, CpiError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Classify + Display,
{
    fn cloud_context<C: Display>(self, context: C) -> Result<T, CpiError> {
        self.map_err(|e| CpiError::new(e.kind(), format!("{context}: {e}")))
    }
}
