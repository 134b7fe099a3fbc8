/// One tab-split line of the parameter file.
pub type ParamTuple = Vec<String>;

/// One fetched record, columns in result-set order. SQL NULL stays `None`
/// all the way to the insert binding.
pub type Row = Vec<Option<String>>;

/// Per-statement result reported by a batch execution.
///
/// The sqlx session only ever reports `Affected`; the other two codes exist
/// for drivers that answer a batch with per-statement status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementOutcome {
    Affected(u64),
    /// The statement ran but the driver could not say how many rows it touched.
    #[allow(dead_code)]
    SuccessNoInfo,
    #[allow(dead_code)]
    ExecuteFailed,
}

impl StatementOutcome {
    pub fn counted_rows(self) -> u64 {
        match self {
            StatementOutcome::Affected(rows) => rows,
            StatementOutcome::SuccessNoInfo => 1,
            StatementOutcome::ExecuteFailed => 0,
        }
    }
}

/// Rows credited to one flushed batch.
pub fn fold_outcomes(outcomes: &[StatementOutcome]) -> u64 {
    outcomes.iter().map(|outcome| outcome.counted_rows()).sum()
}

pub fn describe_tuple(params: &[String]) -> String {
    params.join(", ")
}
