use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use sqlparser::{
    dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect},
    tokenizer::{Token, Tokenizer},
};

use crate::domain::{driver_kind::DriverKind, error::SessionError};

static NUMBERED_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[?$](\d+)$").expect("placeholder pattern is valid"));

/// A select or insert template with its positional placeholder count resolved
/// up front, so binding mismatches are caught before the driver sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTemplate {
    sql: String,
    placeholder_count: usize,
}

impl SqlTemplate {
    pub fn parse(raw_sql: &str, driver: DriverKind) -> Result<Self> {
        if raw_sql.trim().is_empty() {
            return Err(anyhow!("SQL template must not be empty"));
        }

        let tokens = tokenize(raw_sql, driver)?;
        let placeholder_count = count_placeholders(&tokens);

        Ok(Self {
            sql: raw_sql.trim().to_string(),
            placeholder_count,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholder_count
    }

    pub fn check_arity(&self, bound_values: usize) -> Result<(), SessionError> {
        if bound_values != self.placeholder_count {
            return Err(SessionError::ParameterCountMismatch {
                expected: self.placeholder_count,
                actual: bound_values,
            });
        }
        Ok(())
    }
}

fn with_dialect<T>(driver: DriverKind, f: impl FnOnce(&dyn Dialect) -> T) -> T {
    match driver {
        DriverKind::PostgreSql => f(&PostgreSqlDialect {}),
        DriverKind::MySql => f(&MySqlDialect {}),
        DriverKind::Sqlite => f(&SQLiteDialect {}),
    }
}

fn tokenize(raw_sql: &str, driver: DriverKind) -> Result<Vec<Token>> {
    with_dialect(driver, |dialect| Tokenizer::new(dialect, raw_sql).tokenize())
        .with_context(|| format!("Unable to tokenize SQL template for {driver}"))
}

// `?` placeholders are counted one by one; numbered ones (`$2`, `?3`) may
// repeat, so the highest index is the number of values to bind.
fn count_placeholders(tokens: &[Token]) -> usize {
    let mut anonymous = 0usize;
    let mut highest_numbered = 0usize;

    for token in tokens {
        let Token::Placeholder(text) = token else {
            continue;
        };
        match NUMBERED_PLACEHOLDER
            .captures(text)
            .and_then(|captures| captures[1].parse::<usize>().ok())
        {
            Some(index) => highest_numbered = highest_numbered.max(index),
            None => anonymous += 1,
        }
    }

    anonymous + highest_numbered
}
