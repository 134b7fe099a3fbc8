use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    PostgreSql,
    MySql,
    Sqlite,
}

impl DriverKind {
    pub const ALL: [DriverKind; 3] = [DriverKind::PostgreSql, DriverKind::MySql, DriverKind::Sqlite];

    pub fn as_str(self) -> &'static str {
        match self {
            DriverKind::PostgreSql => "postgres",
            DriverKind::MySql => "mysql",
            DriverKind::Sqlite => "sqlite",
        }
    }

    /// URL schemes that select this backend.
    pub fn url_schemes(self) -> &'static [&'static str] {
        match self {
            DriverKind::PostgreSql => &["postgres", "postgresql"],
            DriverKind::MySql => &["mysql", "mariadb"],
            DriverKind::Sqlite => &["sqlite"],
        }
    }

    pub fn accepts_credentials(self) -> bool {
        !matches!(self, DriverKind::Sqlite)
    }

    pub fn matches_url(self, url: &str) -> bool {
        url_scheme(url)
            .map(|scheme| self.url_schemes().contains(&scheme.as_str()))
            .unwrap_or(false)
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" | "org.postgresql.driver" => {
                Ok(DriverKind::PostgreSql)
            }
            "mysql" | "mariadb" | "com.mysql.jdbc.driver" | "com.mysql.cj.jdbc.driver"
            | "org.mariadb.jdbc.driver" => Ok(DriverKind::MySql),
            "sqlite" | "sqlite3" | "org.sqlite.jdbc" => Ok(DriverKind::Sqlite),
            _ => Err(anyhow!(
                "Unsupported driver: {value}. Available values: postgres,mysql,sqlite"
            )),
        }
    }
}

// Accepts the same names as `FromStr`, including JDBC driver class names.
impl<'de> Deserialize<'de> for DriverKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Drops an optional `jdbc:` prefix so JDBC-style URLs can be used as is.
pub fn strip_jdbc_prefix(url: &str) -> &str {
    let trimmed = url.trim();
    match trimmed.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("jdbc:") => &trimmed[5..],
        _ => trimmed,
    }
}

fn url_scheme(url: &str) -> Option<String> {
    let (scheme, _) = strip_jdbc_prefix(url).split_once(':')?;
    if scheme.is_empty() {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}
