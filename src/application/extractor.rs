use tracing::debug;

use crate::{
    application::ports::DatabaseSession,
    domain::{
        error::TransferError,
        record::{ParamTuple, Row},
    },
    infrastructure::sql_template::SqlTemplate,
};

/// Runs the select template for one parameter tuple and materializes the
/// whole result set.
pub async fn select<S: DatabaseSession>(
    session: &mut S,
    template: &SqlTemplate,
    params: &ParamTuple,
) -> Result<Vec<Row>, TransferError> {
    template
        .check_arity(params.len())
        .map_err(TransferError::Query)?;

    let rows = session
        .fetch_rows(template.sql(), params)
        .await
        .map_err(TransferError::Query)?;

    debug!(
        rows = rows.len(),
        columns = rows.first().map(Vec::len).unwrap_or(0),
        "Fetched rows from database(source)"
    );
    Ok(rows)
}
