use std::time::Instant;

use tracing::{error, info, warn};

use crate::{
    application::{
        commands::{MoveRowsResult, RunAborted, TransferConfig},
        extractor, loader,
        ports::{Connector, DatabaseSession},
    },
    domain::{
        endpoint::{DatabaseEndpoint, DatabaseRole},
        error::{SessionError, TransferError},
        record::{ParamTuple, describe_tuple},
    },
    infrastructure::{param_file, sql_template::SqlTemplate},
};

/// Moves rows tuple by tuple: select from the source, insert into the
/// target, one connection of each kind at a time.
pub struct MoveRowsUseCase<C> {
    connector: C,
}

struct PreparedTemplates {
    select: SqlTemplate,
    insert: SqlTemplate,
}

impl<C: Connector> MoveRowsUseCase<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    pub async fn execute(&self, config: &TransferConfig) -> Result<MoveRowsResult, RunAborted> {
        let mut progress = MoveRowsResult::default();

        match self.run(config, &mut progress).await {
            Ok(()) => {
                info!(
                    tuples = progress.tuples_processed,
                    total_rows = progress.total_rows,
                    "Completed all {} processing",
                    progress.total_rows
                );
                Ok(progress)
            }
            Err(error) => {
                error!(
                    phase = error.phase(),
                    completed_tuples = progress.tuples_processed,
                    partial_rows = progress.total_rows,
                    "Error occurred during {} ({error})",
                    error.phase()
                );
                Err(RunAborted {
                    error,
                    partial: progress,
                })
            }
        }
    }

    async fn run(
        &self,
        config: &TransferConfig,
        progress: &mut MoveRowsResult,
    ) -> Result<(), TransferError> {
        let started = Instant::now();
        info!("Finding parameter list file for query binding");
        let param_path = param_file::resolve(&config.param_file, config.base_dir.as_deref())?;
        info!(
            path = %param_path.display(),
            elapsed = %elapsed_secs(started),
            "Completed finding parameter list file for query binding"
        );

        let started = Instant::now();
        info!("Reading parameter list file for query binding");
        let tuples = param_file::read(&param_path)?;
        info!(
            tuples = tuples.len(),
            elapsed = %elapsed_secs(started),
            "Completed reading parameter list file for query binding"
        );

        let started = Instant::now();
        check_driver(&config.source)?;
        check_driver(&config.target)?;
        info!(
            source = %config.source.driver,
            target = %config.target.driver,
            elapsed = %elapsed_secs(started),
            "Completed loading database driver"
        );

        let templates = prepare_templates(config)?;
        info!(
            select_params = templates.select.placeholder_count(),
            insert_params = templates.insert.placeholder_count(),
            "Prepared query templates"
        );

        for params in &tuples {
            info!(params = %describe_tuple(params), "Checking target parameter");
            self.transfer_tuple(config, &templates, params, progress)
                .await?;
        }

        Ok(())
    }

    async fn transfer_tuple(
        &self,
        config: &TransferConfig,
        templates: &PreparedTemplates,
        params: &ParamTuple,
        progress: &mut MoveRowsResult,
    ) -> Result<(), TransferError> {
        let started = Instant::now();
        let mut source = self.open(&config.source, DatabaseRole::Source).await?;
        info!("Selecting data of database(source)");
        let selected = extractor::select(&mut source, &templates.select, params).await;
        let closed = source.close().await;
        let rows = settle(selected, closed, DatabaseRole::Source)?;
        info!(
            rows = rows.len(),
            elapsed = %elapsed_secs(started),
            "Completed {} selection data",
            rows.len()
        );

        if rows.is_empty() {
            progress.tuples_processed += 1;
            return Ok(());
        }

        let started = Instant::now();
        let mut target = self.open(&config.target, DatabaseRole::Target).await?;
        info!("Inserting data of database(target)");
        let inserted = loader::insert(&mut target, &templates.insert, &rows).await;
        let closed = target.close().await;

        // Committed work counts even if the close below fails.
        if let Ok(count) = &inserted {
            progress.tuples_processed += 1;
            progress.total_rows += count;
        }
        let count = settle(inserted, closed, DatabaseRole::Target)?;
        info!(
            rows = count,
            elapsed = %elapsed_secs(started),
            "Completed {count} insertion data"
        );
        Ok(())
    }

    async fn open(
        &self,
        endpoint: &DatabaseEndpoint,
        role: DatabaseRole,
    ) -> Result<C::Session, TransferError> {
        info!(endpoint = %endpoint, "Creating connection of database({role})");
        self.connector
            .open(endpoint)
            .await
            .map_err(|cause| TransferError::Connection { role, cause })
    }
}

/// Combines an operation's result with the close that followed it. The
/// operation's own failure always wins; a close failure after a successful
/// operation becomes a connection error.
fn settle<T>(
    outcome: Result<T, TransferError>,
    closed: Result<(), SessionError>,
    role: DatabaseRole,
) -> Result<T, TransferError> {
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cause)) => Err(TransferError::Connection { role, cause }),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(close_error)) => {
            warn!(%close_error, "Error occurred during close of database({role}) connection");
            Err(error)
        }
    }
}

fn check_driver(endpoint: &DatabaseEndpoint) -> Result<(), TransferError> {
    if endpoint.driver.matches_url(&endpoint.url) {
        return Ok(());
    }
    Err(TransferError::DriverLoad(format!(
        "{} driver cannot open {} (expected scheme {})",
        endpoint.driver,
        endpoint.redacted_url(),
        endpoint.driver.url_schemes().join(" or ")
    )))
}

fn prepare_templates(config: &TransferConfig) -> Result<PreparedTemplates, TransferError> {
    let select = SqlTemplate::parse(&config.select_sql, config.source.driver).map_err(|error| {
        TransferError::Query(SessionError::InvalidStatement(format!("{error:#}")))
    })?;
    let insert = SqlTemplate::parse(&config.insert_sql, config.target.driver).map_err(|error| {
        TransferError::Insert(SessionError::InvalidStatement(format!("{error:#}")))
    })?;

    Ok(PreparedTemplates { select, insert })
}

fn elapsed_secs(started: Instant) -> String {
    format!("{:.3}s", started.elapsed().as_secs_f64())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        fs,
        path::PathBuf,
        time::{Duration, SystemTime, UNIX_EPOCH},
    };

    use crate::{
        application::{
            commands::{MoveRowsResult, TransferConfig},
            ports::testing::{FakeBehavior, FakeConnector, SessionCall},
        },
        domain::{
            driver_kind::DriverKind,
            endpoint::{DatabaseEndpoint, DatabaseRole},
            error::{SessionError, TransferError},
        },
        infrastructure::sqlx_session::SqlxConnector,
    };

    use super::MoveRowsUseCase;

    const SOURCE_URL: &str = "sqlite://source.db";
    const TARGET_URL: &str = "sqlite://target.db";

    fn build_temp_dir(label: &str) -> PathBuf {
        let unique_suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("db_row_mover_{label}_{unique_suffix}"));
        fs::create_dir_all(&dir).expect("temp dir should be created");
        dir
    }

    fn build_config(dir: &PathBuf, param_lines: &str) -> TransferConfig {
        let param_file = dir.join("params.tsv");
        fs::write(&param_file, param_lines).expect("param file should be written");

        TransferConfig {
            param_file,
            base_dir: None,
            source: DatabaseEndpoint::new(DriverKind::Sqlite, SOURCE_URL, "", ""),
            target: DatabaseEndpoint::new(DriverKind::Sqlite, TARGET_URL, "", ""),
            select_sql: "SELECT id, name FROM src WHERE a = ? AND b = ?".to_string(),
            insert_sql: "INSERT INTO dst (id, name) VALUES (?, ?)".to_string(),
            statement_timeout: Duration::from_secs(5),
        }
    }

    fn tuple(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn two_rows() -> Vec<Vec<Option<String>>> {
        vec![
            vec![Some("1".to_string()), Some("first".to_string())],
            vec![Some("2".to_string()), Some("second".to_string())],
        ]
    }

    #[tokio::test]
    async fn skips_loader_for_tuples_without_rows() {
        let dir = build_temp_dir("skip_empty");
        let config = build_config(&dir, "A\tB\nC\tD\n");
        let connector = FakeConnector::default().with_behavior(
            SOURCE_URL,
            FakeBehavior {
                results: HashMap::from([(tuple(&["A", "B"]), two_rows())]),
                ..FakeBehavior::default()
            },
        );
        let use_case = MoveRowsUseCase::new(connector);

        let result = use_case.execute(&config).await.expect("run should succeed");

        assert_eq!(
            result,
            MoveRowsResult {
                tuples_processed: 2,
                total_rows: 2
            }
        );
        assert_eq!(
            use_case.connector.calls_for(SOURCE_URL),
            vec![
                SessionCall::Open,
                SessionCall::Fetch(tuple(&["A", "B"])),
                SessionCall::Close,
                SessionCall::Open,
                SessionCall::Fetch(tuple(&["C", "D"])),
                SessionCall::Close,
            ]
        );
        let target_opens = use_case
            .connector
            .calls_for(TARGET_URL)
            .into_iter()
            .filter(|call| *call == SessionCall::Open)
            .count();
        assert_eq!(target_opens, 1);

        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[tokio::test]
    async fn source_is_closed_before_target_is_opened() {
        let dir = build_temp_dir("ordering");
        let config = build_config(&dir, "A\tB\n");
        let connector = FakeConnector::default().with_behavior(
            SOURCE_URL,
            FakeBehavior {
                results: HashMap::from([(tuple(&["A", "B"]), two_rows())]),
                ..FakeBehavior::default()
            },
        );
        let use_case = MoveRowsUseCase::new(connector);

        use_case.execute(&config).await.expect("run should succeed");

        let labels = use_case
            .connector
            .calls()
            .into_iter()
            .map(|(label, call)| (label == SOURCE_URL, call))
            .collect::<Vec<_>>();
        let source_close = labels
            .iter()
            .position(|entry| *entry == (true, SessionCall::Close))
            .expect("source should be closed");
        let target_open = labels
            .iter()
            .position(|entry| *entry == (false, SessionCall::Open))
            .expect("target should be opened");
        assert!(source_close < target_open);
        assert_eq!(labels.last(), Some(&(false, SessionCall::Close)));

        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[tokio::test]
    async fn insert_failure_aborts_run_after_closing_target() {
        let dir = build_temp_dir("insert_failure");
        let config = build_config(&dir, "A\tB\nC\tD\nE\tF\n");
        let rows = two_rows();
        let connector = FakeConnector::default()
            .with_behavior(
                SOURCE_URL,
                FakeBehavior {
                    results: HashMap::from([
                        (tuple(&["A", "B"]), rows.clone()),
                        (tuple(&["C", "D"]), rows.clone()),
                        (tuple(&["E", "F"]), rows),
                    ]),
                    ..FakeBehavior::default()
                },
            )
            .with_behavior(
                TARGET_URL,
                FakeBehavior {
                    fail_batch_call: Some(1),
                    ..FakeBehavior::default()
                },
            );
        let use_case = MoveRowsUseCase::new(connector);

        let aborted = use_case.execute(&config).await.expect_err("insert should fail");

        assert!(matches!(aborted.error, TransferError::Insert(_)));
        assert_eq!(aborted.partial, MoveRowsResult::default());

        let target_calls = use_case.connector.calls_for(TARGET_URL);
        assert_eq!(
            &target_calls[target_calls.len() - 2..],
            &[SessionCall::Rollback, SessionCall::Close]
        );
        let fetches = use_case
            .connector
            .calls_for(SOURCE_URL)
            .into_iter()
            .filter(|call| matches!(call, SessionCall::Fetch(_)))
            .count();
        assert_eq!(fetches, 1, "no tuple after the failing one is processed");

        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[tokio::test]
    async fn query_failure_still_closes_source_and_skips_target() {
        let dir = build_temp_dir("query_failure");
        let config = build_config(&dir, "A\tB\n");
        let connector = FakeConnector::default().with_behavior(
            SOURCE_URL,
            FakeBehavior {
                fail_fetch: true,
                fail_close: true,
                ..FakeBehavior::default()
            },
        );
        let use_case = MoveRowsUseCase::new(connector);

        let aborted = use_case.execute(&config).await.expect_err("query should fail");

        assert!(matches!(aborted.error, TransferError::Query(SessionError::Driver(_))));
        assert_eq!(
            use_case.connector.calls_for(SOURCE_URL).last(),
            Some(&SessionCall::Close)
        );
        assert!(use_case.connector.calls_for(TARGET_URL).is_empty());

        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[tokio::test]
    async fn target_close_failure_keeps_committed_count() {
        let dir = build_temp_dir("close_failure");
        let config = build_config(&dir, "A\tB\nC\tD\n");
        let connector = FakeConnector::default()
            .with_behavior(
                SOURCE_URL,
                FakeBehavior {
                    results: HashMap::from([(tuple(&["A", "B"]), two_rows())]),
                    ..FakeBehavior::default()
                },
            )
            .with_behavior(
                TARGET_URL,
                FakeBehavior {
                    fail_close: true,
                    ..FakeBehavior::default()
                },
            );
        let use_case = MoveRowsUseCase::new(connector);

        let aborted = use_case.execute(&config).await.expect_err("close should fail");

        assert!(matches!(
            aborted.error,
            TransferError::Connection {
                role: DatabaseRole::Target,
                ..
            }
        ));
        assert_eq!(
            aborted.partial,
            MoveRowsResult {
                tuples_processed: 1,
                total_rows: 2
            }
        );

        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[tokio::test]
    async fn refused_connection_aborts_before_any_query() {
        let dir = build_temp_dir("refused");
        let config = build_config(&dir, "A\tB\n");
        let mut connector = FakeConnector::default();
        connector.refuse.insert(SOURCE_URL.to_string());
        let use_case = MoveRowsUseCase::new(connector);

        let aborted = use_case.execute(&config).await.expect_err("open should fail");

        assert!(matches!(
            aborted.error,
            TransferError::Connection {
                role: DatabaseRole::Source,
                ..
            }
        ));
        assert!(use_case.connector.calls().is_empty());

        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[tokio::test]
    async fn driver_url_mismatch_aborts_before_connecting() {
        let dir = build_temp_dir("driver_mismatch");
        let mut config = build_config(&dir, "A\tB\n");
        config.target = DatabaseEndpoint::new(DriverKind::PostgreSql, TARGET_URL, "", "");
        let use_case = MoveRowsUseCase::new(FakeConnector::default());

        let aborted = use_case.execute(&config).await.expect_err("driver should not load");

        assert!(matches!(aborted.error, TransferError::DriverLoad(_)));
        assert!(use_case.connector.calls().is_empty());

        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[tokio::test]
    async fn missing_parameter_file_aborts_cleanly() {
        let dir = build_temp_dir("missing_params");
        let mut config = build_config(&dir, "");
        config.param_file = dir.join("absent.tsv");
        config.base_dir = Some(dir.clone());
        let use_case = MoveRowsUseCase::new(FakeConnector::default());

        let aborted = use_case.execute(&config).await.expect_err("file is missing");

        assert!(matches!(aborted.error, TransferError::FileNotFound(_)));
        assert!(use_case.connector.calls().is_empty());

        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[tokio::test]
    async fn moves_rows_between_sqlite_databases() {
        let dir = build_temp_dir("sqlite_end_to_end");
        let source_url = format!("sqlite://{}?mode=rwc", dir.join("source.db").display());
        let target_url = format!("sqlite://{}?mode=rwc", dir.join("target.db").display());

        let connector = SqlxConnector::new(Duration::from_secs(5));
        for (url, script) in [
            (
                &source_url,
                "CREATE TABLE src (id INTEGER, name TEXT, region TEXT); \
                 INSERT INTO src VALUES (1, 'ada', 'EU'), (2, NULL, 'EU'), (3, 'lin', 'US');",
            ),
            (&target_url, "CREATE TABLE dst (id INTEGER, name TEXT);"),
        ] {
            let mut conn = <sqlx::SqliteConnection as sqlx::Connection>::connect(url)
                .await
                .expect("fixture connection should open");
            sqlx::raw_sql(script)
                .execute(&mut conn)
                .await
                .expect("fixture should be created");
            sqlx::Connection::close(conn)
                .await
                .expect("fixture connection should close");
        }

        let param_file = dir.join("params.tsv");
        fs::write(&param_file, "EU\nAPAC\nUS\n").expect("param file should be written");
        let config = TransferConfig {
            param_file,
            base_dir: None,
            source: DatabaseEndpoint::new(DriverKind::Sqlite, source_url, "", ""),
            target: DatabaseEndpoint::new(DriverKind::Sqlite, target_url.clone(), "", ""),
            select_sql: "SELECT id, name FROM src WHERE region = ? ORDER BY id".to_string(),
            insert_sql: "INSERT INTO dst (id, name) VALUES (?, ?)".to_string(),
            statement_timeout: Duration::from_secs(5),
        };

        let result = MoveRowsUseCase::new(connector)
            .execute(&config)
            .await
            .expect("run should succeed");
        assert_eq!(
            result,
            MoveRowsResult {
                tuples_processed: 3,
                total_rows: 3
            }
        );

        let mut conn = <sqlx::SqliteConnection as sqlx::Connection>::connect(&target_url)
            .await
            .expect("target should open");
        let copied: Vec<(i64, Option<String>)> =
            sqlx::query_as("SELECT id, name FROM dst ORDER BY id")
                .fetch_all(&mut conn)
                .await
                .expect("target rows should be readable");
        assert_eq!(
            copied,
            vec![
                (1, Some("ada".to_string())),
                (2, None),
                (3, Some("lin".to_string())),
            ]
        );
        sqlx::Connection::close(conn)
            .await
            .expect("target should close");

        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }
}
