use std::{fmt, path::PathBuf, time::Duration};

use crate::domain::{endpoint::DatabaseEndpoint, error::TransferError};

/// Everything one run needs, assembled once at startup.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub param_file: PathBuf,
    pub base_dir: Option<PathBuf>,
    pub source: DatabaseEndpoint,
    pub target: DatabaseEndpoint,
    pub select_sql: String,
    pub insert_sql: String,
    /// Bounds connects, selects and batch executions. Zero disables it.
    pub statement_timeout: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveRowsResult {
    pub tuples_processed: usize,
    pub total_rows: u64,
}

/// A run that stopped early, with the totals of the tuples it finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunAborted {
    pub error: TransferError,
    pub partial: MoveRowsResult,
}

impl fmt::Display for RunAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} tuple(s) completed, {} row(s) processed before abort)",
            self.error, self.partial.tuples_processed, self.partial.total_rows
        )
    }
}

impl std::error::Error for RunAborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
