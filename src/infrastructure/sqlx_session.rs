use std::{future::Future, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sqlx::{
    Column as _, ColumnIndex, Connection as _, Decode, Executor as _, MySqlConnection,
    PgConnection, Row as _, SqliteConnection, Type, TypeInfo as _,
    mysql::MySqlRow,
    postgres::PgRow,
    sqlite::SqliteRow,
    types::{
        Decimal, JsonValue, Uuid,
        chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc},
    },
};

use crate::{
    application::ports::{Connector, DatabaseSession},
    domain::{
        driver_kind::DriverKind,
        endpoint::DatabaseEndpoint,
        error::SessionError,
        record::{Row, StatementOutcome},
    },
};

/// Opens native `sqlx` connections for PostgreSQL, MySQL and SQLite URLs.
#[derive(Debug, Clone)]
pub struct SqlxConnector {
    statement_timeout: Duration,
}

impl SqlxConnector {
    pub fn new(statement_timeout: Duration) -> Self {
        Self { statement_timeout }
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    type Session = SqlxSession;

    async fn open(&self, endpoint: &DatabaseEndpoint) -> Result<SqlxSession, SessionError> {
        let url = endpoint.connect_url()?;
        let limit = self.statement_timeout;

        let conn = match endpoint.driver {
            DriverKind::PostgreSql => {
                NativeConnection::Postgres(with_timeout(limit, PgConnection::connect(&url)).await?)
            }
            DriverKind::MySql => {
                NativeConnection::MySql(with_timeout(limit, MySqlConnection::connect(&url)).await?)
            }
            DriverKind::Sqlite => {
                NativeConnection::Sqlite(with_timeout(limit, SqliteConnection::connect(&url)).await?)
            }
        };

        Ok(SqlxSession {
            conn,
            statement_timeout: limit,
            in_transaction: false,
        })
    }
}

enum NativeConnection {
    Postgres(PgConnection),
    MySql(MySqlConnection),
    Sqlite(SqliteConnection),
}

/// Runs `$body` once per backend with `$conn` bound to the concrete connection.
macro_rules! on_native {
    ($connection:expr, $conn:ident => $body:expr) => {
        match $connection {
            NativeConnection::Postgres($conn) => $body,
            NativeConnection::MySql($conn) => $body,
            NativeConnection::Sqlite($conn) => $body,
        }
    };
}

/// One connection. Writes go through an explicit transaction that is opened
/// by the first non-empty batch and closed by `commit` or `rollback`.
pub struct SqlxSession {
    conn: NativeConnection,
    statement_timeout: Duration,
    in_transaction: bool,
}

impl SqlxSession {
    async fn run_control(&mut self, command: &'static str) -> Result<(), SessionError> {
        let limit = self.statement_timeout;
        on_native!(&mut self.conn, conn => {
            with_timeout(limit, conn.execute(command)).await.map(|_| ())
        })
    }

    async fn begin_if_needed(&mut self) -> Result<(), SessionError> {
        if !self.in_transaction {
            self.run_control("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseSession for SqlxSession {
    async fn fetch_rows(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>, SessionError> {
        let limit = self.statement_timeout;
        on_native!(&mut self.conn, conn => {
            let mut query = sqlx::query(sql);
            for param in params {
                query = query.bind(param.as_str());
            }
            let records = with_timeout(limit, query.fetch_all(&mut *conn)).await?;
            materialize_rows(&records)
        })
    }

    async fn execute_batch(
        &mut self,
        sql: &str,
        batch: &[Row],
    ) -> Result<Vec<StatementOutcome>, SessionError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        self.begin_if_needed().await?;

        let limit = self.statement_timeout;
        on_native!(&mut self.conn, conn => {
            with_timeout(limit, async move {
                let mut outcomes = Vec::with_capacity(batch.len());
                for row in batch {
                    let mut statement = sqlx::query(sql);
                    for value in row {
                        statement = statement.bind(value.as_deref());
                    }
                    let result = statement.execute(&mut *conn).await?;
                    outcomes.push(StatementOutcome::Affected(result.rows_affected()));
                }
                Ok::<_, sqlx::Error>(outcomes)
            })
            .await
        })
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        if self.in_transaction {
            self.run_control("COMMIT").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        if self.in_transaction {
            self.in_transaction = false;
            self.run_control("ROLLBACK").await?;
        }
        Ok(())
    }

    async fn close(self) -> Result<(), SessionError> {
        let limit = self.statement_timeout;
        on_native!(self.conn, conn => with_timeout(limit, conn.close()).await)
    }
}

async fn with_timeout<T, F>(limit: Duration, future: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    if limit.is_zero() {
        return future.await.map_err(SessionError::from);
    }
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(SessionError::from),
        Err(_) => Err(SessionError::Timeout(limit)),
    }
}

/// Renders one column of a fetched record as text. `None` means no decoder
/// of the backend understands the column type.
trait ColumnText: sqlx::Row {
    fn column_text(&self, name: &str) -> Option<Option<String>>;
}

impl ColumnText for PgRow {
    fn column_text(&self, name: &str) -> Option<Option<String>> {
        decoded(self, name, |text: String| text)
            .or_else(|| decoded(self, name, |number: i16| number.to_string()))
            .or_else(|| decoded(self, name, |number: i32| number.to_string()))
            .or_else(|| decoded(self, name, |number: i64| number.to_string()))
            .or_else(|| decoded(self, name, |number: f32| number.to_string()))
            .or_else(|| decoded(self, name, |number: f64| number.to_string()))
            .or_else(|| decoded(self, name, |number: Decimal| number.to_string()))
            .or_else(|| decoded(self, name, |flag: bool| flag.to_string()))
            .or_else(|| decoded(self, name, |date: NaiveDate| date.to_string()))
            .or_else(|| decoded(self, name, |time: NaiveTime| time.to_string()))
            .or_else(|| decoded(self, name, |stamp: NaiveDateTime| stamp.to_string()))
            .or_else(|| decoded(self, name, |stamp: DateTime<Utc>| stamp.to_rfc3339()))
            .or_else(|| decoded(self, name, |id: Uuid| id.to_string()))
            .or_else(|| decoded(self, name, |json: JsonValue| json.to_string()))
            .or_else(|| decoded(self, name, |bytes: Vec<u8>| BASE64.encode(bytes)))
    }
}

impl ColumnText for MySqlRow {
    fn column_text(&self, name: &str) -> Option<Option<String>> {
        decoded(self, name, |text: String| text)
            .or_else(|| decoded(self, name, |number: i8| number.to_string()))
            .or_else(|| decoded(self, name, |number: i16| number.to_string()))
            .or_else(|| decoded(self, name, |number: i32| number.to_string()))
            .or_else(|| decoded(self, name, |number: i64| number.to_string()))
            .or_else(|| decoded(self, name, |number: u8| number.to_string()))
            .or_else(|| decoded(self, name, |number: u16| number.to_string()))
            .or_else(|| decoded(self, name, |number: u32| number.to_string()))
            .or_else(|| decoded(self, name, |number: u64| number.to_string()))
            .or_else(|| decoded(self, name, |number: f32| number.to_string()))
            .or_else(|| decoded(self, name, |number: f64| number.to_string()))
            .or_else(|| decoded(self, name, |number: Decimal| number.to_string()))
            .or_else(|| decoded(self, name, |flag: bool| flag.to_string()))
            .or_else(|| decoded(self, name, |date: NaiveDate| date.to_string()))
            .or_else(|| decoded(self, name, |time: NaiveTime| time.to_string()))
            .or_else(|| decoded(self, name, |stamp: NaiveDateTime| stamp.to_string()))
            .or_else(|| decoded(self, name, |stamp: DateTime<Utc>| stamp.to_rfc3339()))
            .or_else(|| decoded(self, name, |json: JsonValue| json.to_string()))
            .or_else(|| decoded(self, name, |bytes: Vec<u8>| BASE64.encode(bytes)))
    }
}

// SQLite values are checked against their storage class, not the declared
// column type, so these four cover DATETIME, BOOLEAN and NUMERIC columns too.
impl ColumnText for SqliteRow {
    fn column_text(&self, name: &str) -> Option<Option<String>> {
        decoded(self, name, |text: String| text)
            .or_else(|| decoded(self, name, |number: i64| number.to_string()))
            .or_else(|| decoded(self, name, |number: f64| number.to_string()))
            .or_else(|| decoded(self, name, |bytes: Vec<u8>| BASE64.encode(bytes)))
    }
}

fn decoded<'r, R, T>(
    record: &'r R,
    name: &str,
    render: impl FnOnce(T) -> String,
) -> Option<Option<String>>
where
    R: sqlx::Row,
    for<'n> &'n str: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    record
        .try_get::<Option<T>, _>(name)
        .ok()
        .map(|value| value.map(render))
}

// Column names come from the first record; every record is then read by
// name so the column order matches the select list.
fn materialize_rows<R>(records: &[R]) -> Result<Vec<Row>, SessionError>
where
    R: ColumnText,
    for<'n> &'n str: ColumnIndex<R>,
{
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };
    let column_names = first
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect::<Vec<_>>();

    records
        .iter()
        .map(|record| {
            column_names
                .iter()
                .map(|name| {
                    record
                        .column_text(name)
                        .ok_or_else(|| unreadable_column(record, name))
                })
                .collect::<Result<Row, _>>()
        })
        .collect()
}

fn unreadable_column<R>(record: &R, name: &str) -> SessionError
where
    R: sqlx::Row,
    for<'n> &'n str: ColumnIndex<R>,
{
    let type_name = record
        .try_column(name)
        .map(|column| column.type_info().name().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    SessionError::Driver(format!(
        "column `{name}` of type {type_name} cannot be read as text"
    ))
}
