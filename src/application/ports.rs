use async_trait::async_trait;

use crate::domain::{
    endpoint::DatabaseEndpoint,
    error::SessionError,
    record::{Row, StatementOutcome},
};

/// Opens sessions with auto-commit disabled: nothing a session writes is
/// visible until `commit` succeeds.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: DatabaseSession;

    async fn open(&self, endpoint: &DatabaseEndpoint) -> Result<Self::Session, SessionError>;
}

#[async_trait]
pub trait DatabaseSession: Send {
    /// Runs `sql` with `params` bound positionally and returns every row,
    /// each column read by name and rendered as text.
    async fn fetch_rows(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>, SessionError>;

    /// Executes `sql` once per row inside the open transaction, starting one
    /// if needed. Returns one outcome per row, in order.
    async fn execute_batch(
        &mut self,
        sql: &str,
        batch: &[Row],
    ) -> Result<Vec<StatementOutcome>, SessionError>;

    async fn commit(&mut self) -> Result<(), SessionError>;

    async fn rollback(&mut self) -> Result<(), SessionError>;

    async fn close(self) -> Result<(), SessionError>;
}
