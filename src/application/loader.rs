use tracing::{debug, error};

use crate::{
    application::ports::DatabaseSession,
    domain::{
        error::{SessionError, TransferError},
        flush_plan::FlushPlan,
        record::{Row, fold_outcomes},
    },
    infrastructure::sql_template::SqlTemplate,
};

/// Inserts `rows` through the insert template, committing after every flush.
///
/// Batches follow [`FlushPlan`]: row 0 alone, then up to every multiple of
/// the flush interval, then the remainder. On any failure the open
/// transaction is rolled back and no count is returned; batches committed by
/// earlier flushes of this call stay committed.
pub async fn insert<S: DatabaseSession>(
    session: &mut S,
    template: &SqlTemplate,
    rows: &[Row],
) -> Result<u64, TransferError> {
    if rows.is_empty() {
        return Ok(0);
    }

    match write_batches(session, template, rows).await {
        Ok(count) => Ok(count),
        Err(cause) => {
            if let Err(rollback_error) = session.rollback().await {
                error!(%rollback_error, "Error occurred during rollback of database(target)");
            }
            Err(TransferError::Insert(cause))
        }
    }
}

async fn write_batches<S: DatabaseSession>(
    session: &mut S,
    template: &SqlTemplate,
    rows: &[Row],
) -> Result<u64, SessionError> {
    let plan = FlushPlan::for_rows(rows.len());
    debug!(rows = rows.len(), flushes = plan.flush_count(), "Planned batches for database(target)");
    let mut count = 0u64;

    for batch_range in plan.iter_batches() {
        let batch = &rows[batch_range];
        for row in batch {
            template.check_arity(row.len())?;
        }

        let outcomes = session.execute_batch(template.sql(), batch).await?;
        session.commit().await?;

        let applied = fold_outcomes(&outcomes);
        debug!(statements = batch.len(), applied, "Committed batch to database(target)");
        count += applied;
    }

    Ok(count)
}
