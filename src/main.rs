mod application;
mod domain;
mod infrastructure;
mod interfaces;
mod logging;

use std::process::ExitCode;

use console::style;
use tracing::error;

use crate::application::use_cases::move_rows::MoveRowsUseCase;
use crate::infrastructure::sqlx_session::SqlxConnector;
use crate::interfaces::cli::Invocation;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let invocation = Invocation::from_env();
    logging::init(invocation.log_level());

    let config = match invocation.collect_transfer_config() {
        Ok(config) => config,
        Err(error) => {
            error!("Error occurred during configuration ({error:#})");
            return ExitCode::FAILURE;
        }
    };

    let use_case = MoveRowsUseCase::new(SqlxConnector::new(config.statement_timeout));

    println!("{}", style("Moving rows...").cyan());
    // An aborted run has already been reported by the use case.
    let Ok(result) = use_case.execute(&config).await else {
        return ExitCode::FAILURE;
    };

    println!(
        "{} {} ({} parameter tuples)",
        style("Rows moved:").green(),
        style(result.total_rows).bold(),
        result.tuples_processed,
    );
    ExitCode::SUCCESS
}
