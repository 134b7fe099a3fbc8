use std::{
    fmt::{self, Display},
    path::PathBuf,
    time::Duration,
};

use crate::domain::endpoint::DatabaseRole;

/// Failure reported by a database session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    Timeout(Duration),
    ParameterCountMismatch { expected: usize, actual: usize },
    InvalidStatement(String),
    InvalidUrl(String),
    Driver(String),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Timeout(limit) => {
                write!(f, "statement timed out after {limit:?}")
            }
            SessionError::ParameterCountMismatch { expected, actual } => write!(
                f,
                "statement expects {expected} parameter(s) but {actual} were bound"
            ),
            SessionError::InvalidStatement(message) => write!(f, "invalid statement: {message}"),
            SessionError::InvalidUrl(message) => write!(f, "invalid connection url: {message}"),
            SessionError::Driver(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<sqlx::Error> for SessionError {
    fn from(error: sqlx::Error) -> Self {
        SessionError::Driver(error.to_string())
    }
}

/// Reasons a transfer run stops early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    FileNotFound(Vec<PathBuf>),
    FileRead { path: PathBuf, message: String },
    DriverLoad(String),
    Connection { role: DatabaseRole, cause: SessionError },
    Query(SessionError),
    Insert(SessionError),
}

impl TransferError {
    /// Phase name used in the one-line failure report.
    pub fn phase(&self) -> &'static str {
        match self {
            TransferError::FileNotFound(_) => "finding parameter file",
            TransferError::FileRead { .. } => "reading parameter file",
            TransferError::DriverLoad(_) => "loading database driver",
            TransferError::Connection {
                role: DatabaseRole::Source,
                ..
            } => "connection of database(source)",
            TransferError::Connection {
                role: DatabaseRole::Target,
                ..
            } => "connection of database(target)",
            TransferError::Query(_) => "select of database(source)",
            TransferError::Insert(_) => "insert of database(target)",
        }
    }
}

impl Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::FileNotFound(candidates) => {
                let tried = candidates
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Parameter file does not exist (tried: {tried})")
            }
            TransferError::FileRead { path, message } => {
                write!(f, "Unable to read parameter file {}: {message}", path.display())
            }
            TransferError::DriverLoad(message) => {
                write!(f, "Unable to load database driver: {message}")
            }
            TransferError::Connection { role, cause } => {
                write!(f, "Connection of database({role}) failed: {cause}")
            }
            TransferError::Query(cause) => write!(f, "Select of database(source) failed: {cause}"),
            TransferError::Insert(cause) => write!(f, "Insert of database(target) failed: {cause}"),
        }
    }
}

impl std::error::Error for TransferError {}
