//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Unknown session, snapshot, tag, or plan.
    NotFound(String),
    /// A record with the same name already exists (active or archived).
    AlreadyExists(String),
    /// Operation is not valid for the record's current status.
    InvalidState(String),
    /// Destructive operation on a running session without force.
    ResourceBusy(String),
    /// Capability not offered by the underlying runtime.
    Unsupported(String),
    /// Container runtime, version control, or store collaborator failed.
    ExternalFailure(String),
    /// Task graph still has a residual cycle after scheduling.
    Unschedulable(String),
    /// Two task nodes share the same identifier.
    DuplicateId(String),
    /// Caller supplied a malformed name, command, or duration.
    InvalidArgument(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// A batch operation finished with at least one failed item.
    Partial(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::ResourceBusy(msg) => write!(f, "resource busy: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Self::ExternalFailure(msg) => write!(f, "external failure: {msg}"),
            Self::Unschedulable(msg) => write!(f, "unschedulable: {msg}"),
            Self::DuplicateId(msg) => write!(f, "duplicate id: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Partial(msg) => write!(f, "partial failure: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Whether this error reports a missing entity.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(format!("json: {err}"))
    }
}
