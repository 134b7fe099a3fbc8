use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Result, anyhow};
use clap::Parser;
use console::style;
use dialoguer::{Confirm, Editor, Input, Password, theme::ColorfulTheme};

use crate::{
    application::commands::TransferConfig,
    domain::{driver_kind::DriverKind, endpoint::DatabaseEndpoint},
    infrastructure::config_file::{self, EndpointConfig, MoverConfig},
};

const DEFAULT_CONFIG: &str = "db-row-mover.yaml";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Parser)]
#[command(
    name = "db-row-mover",
    version,
    about = "Copy rows from a source database into a target database, one parameter tuple at a time"
)]
pub struct CliArgs {
    #[arg(
        long,
        short = 'c',
        help = "Config file: YAML, or .properties with FROM.DB.* / TO.DB.* keys"
    )]
    config: Option<PathBuf>,
    #[arg(long, short = 'p', help = "Tab separated parameter file, overrides params.file")]
    params: Option<PathBuf>,
    #[arg(long, short = 'b', help = "Directory used to resolve a relative parameter file")]
    base_dir: Option<PathBuf>,
    #[arg(long, short = 't', help = "Statement timeout in seconds, 0 disables it")]
    timeout: Option<u64>,
    #[arg(long, env = "SOURCE_DB_PASSWORD", hide_env_values = true)]
    source_password: Option<String>,
    #[arg(long, env = "TARGET_DB_PASSWORD", hide_env_values = true)]
    target_password: Option<String>,
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, help = "Log level (error, warn, info, debug, trace)")]
    log_level: String,
}

/// How the binary was started: bare for the guided prompts, or with flags.
#[derive(Debug)]
pub enum Invocation {
    Interactive,
    Arguments(CliArgs),
}

/// Values given on the command line or in the environment; each one wins
/// over the matching entry of the config file.
#[derive(Debug, Default)]
struct Overrides {
    params: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    source_password: Option<String>,
    target_password: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut MoverConfig) {
        if let Some(params) = self.params {
            config.params.file = Some(params);
        }
        if let Some(base_dir) = self.base_dir {
            config.params.base_dir = Some(base_dir);
        }
        if let Some(seconds) = self.timeout_secs {
            config.timeout_secs = Some(seconds);
        }
        if let Some(password) = self.source_password {
            config.source.password = Some(password);
        }
        if let Some(password) = self.target_password {
            config.target.password = Some(password);
        }
    }
}

impl Invocation {
    pub fn from_env() -> Self {
        if env::args_os().len() == 1 {
            return Invocation::Interactive;
        }
        Invocation::Arguments(CliArgs::parse())
    }

    pub fn log_level(&self) -> &str {
        match self {
            Invocation::Interactive => DEFAULT_LOG_LEVEL,
            Invocation::Arguments(args) => &args.log_level,
        }
    }

    pub fn collect_transfer_config(self) -> Result<TransferConfig> {
        match self {
            Invocation::Interactive => collect_interactive_config(),
            Invocation::Arguments(args) => collect_config_from_args(args),
        }
    }
}

fn collect_config_from_args(args: CliArgs) -> Result<TransferConfig> {
    let config_path = args.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut file_config = config_file::load(&config_path)?;

    Overrides {
        params: args.params,
        base_dir: args.base_dir,
        timeout_secs: args.timeout,
        source_password: args.source_password,
        target_password: args.target_password,
    }
    .apply(&mut file_config);

    build_transfer_config(file_config, |role| {
        Err(anyhow!("Missing {role} query in config file"))
    })
}

fn collect_interactive_config() -> Result<TransferConfig> {
    let theme = ColorfulTheme::default();

    println!();
    println!(
        "{}",
        style(" DB ROW MOVER ").black().on_cyan().bold().underlined()
    );
    println!("{}", style("Copy rows between databases, one parameter tuple at a time").dim());
    println!();

    let config_path: String = Input::with_theme(&theme)
        .with_prompt("Config file")
        .default(DEFAULT_CONFIG.to_string())
        .interact_text()?;
    let mut file_config = config_file::load(Path::new(config_path.trim()))?;

    for (role, endpoint) in [
        ("source", &mut file_config.source),
        ("target", &mut file_config.target),
    ] {
        if endpoint.user.is_some() && endpoint.password.is_none() {
            let password = Password::with_theme(&theme)
                .with_prompt(format!("Password for {role} database"))
                .allow_empty_password(true)
                .interact()?;
            endpoint.password = Some(password);
        }
    }

    let config = build_transfer_config(file_config, |role| {
        Editor::new()
            .extension(".sql")
            .edit(&format!("-- {role} query\n"))?
            .map(|edited| strip_editor_header(&edited))
            .filter(|sql| !sql.trim().is_empty())
            .ok_or_else(|| anyhow!("No {role} query detected from editor"))
    })?;

    println!();
    println!("{} {}", style("Source:").bold(), config.source);
    println!("{} {}", style("Target:").bold(), config.target);
    println!("{} {}", style("Parameters:").bold(), config.param_file.display());
    println!();

    let confirmed = Confirm::with_theme(&theme)
        .with_prompt("Start moving rows?")
        .default(true)
        .interact()?;
    if !confirmed {
        return Err(anyhow!("Run cancelled"));
    }

    Ok(config)
}

/// `missing_query` is asked for a query the config file does not define.
fn build_transfer_config(
    file_config: MoverConfig,
    mut missing_query: impl FnMut(&str) -> Result<String>,
) -> Result<TransferConfig> {
    let MoverConfig {
        mut source,
        mut target,
        params,
        timeout_secs,
    } = file_config;

    let select_sql = match non_blank(source.query.take()) {
        Some(sql) => sql,
        None => missing_query("source")?,
    };
    let insert_sql = match non_blank(target.query.take()) {
        Some(sql) => sql,
        None => missing_query("target")?,
    };

    let param_file = params.file.ok_or_else(|| {
        anyhow!("Missing parameter file: set params.file (FROM.DB.PARAM) or pass --params")
    })?;

    Ok(TransferConfig {
        param_file,
        base_dir: params.base_dir,
        source: build_endpoint(source, "source")?,
        target: build_endpoint(target, "target")?,
        select_sql,
        insert_sql,
        statement_timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
    })
}

fn build_endpoint(endpoint: EndpointConfig, role: &str) -> Result<DatabaseEndpoint> {
    let driver = match endpoint.driver {
        Some(driver) => driver,
        None => DriverKind::ALL
            .into_iter()
            .find(|driver| driver.matches_url(&endpoint.url))
            .ok_or_else(|| {
                anyhow!(
                    "Unable to load database driver for {role}: no driver handles {}",
                    endpoint.url
                )
            })?,
    };

    Ok(DatabaseEndpoint::new(
        driver,
        endpoint.url,
        endpoint.user.unwrap_or_default(),
        endpoint.password.unwrap_or_default(),
    ))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn strip_editor_header(edited: &str) -> String {
    edited
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::PathBuf,
        time::{Duration, SystemTime, UNIX_EPOCH},
    };

    use clap::Parser;

    use crate::domain::driver_kind::DriverKind;

    use super::{CliArgs, Invocation};

    const BASE_CONFIG: &str = "\
source:
  url: jdbc:postgresql://src-db:5432/legacy
  user: reader
  password: from-file
  query: SELECT id, name FROM customers WHERE region = $1
target:
  driver: mysql
  url: mysql://dst-db:3306/app
  user: writer
  query: INSERT INTO customers (id, name) VALUES (?, ?)
params:
  file: regions.tsv
  base_dir: /opt/mover
timeout_secs: 15
";

    fn build_temp_config_file(content: &str, extension: &str) -> PathBuf {
        let unique_suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        let path =
            std::env::temp_dir().join(format!("db_row_mover_cli_{unique_suffix}.{extension}"));
        fs::write(&path, content).expect("temp config file should be written");
        path
    }

    fn path_arg(path: &PathBuf) -> &str {
        path.to_str()
            .expect("temp config path should be valid utf8 for test")
    }

    fn invocation(args: &[&str]) -> Invocation {
        let argv = std::iter::once("db-row-mover").chain(args.iter().copied());
        Invocation::Arguments(CliArgs::try_parse_from(argv).expect("cli args should parse"))
    }

    #[test]
    fn builds_config_from_yaml_file() {
        let config_file = build_temp_config_file(BASE_CONFIG, "yaml");

        let invocation = invocation(&["--config", path_arg(&config_file)]);
        assert_eq!(invocation.log_level(), "info");
        let config = invocation
            .collect_transfer_config()
            .expect("config should be created");

        assert_eq!(config.source.driver, DriverKind::PostgreSql);
        assert_eq!(config.source.user, "reader");
        assert_eq!(config.target.driver, DriverKind::MySql);
        assert_eq!(config.param_file, PathBuf::from("regions.tsv"));
        assert_eq!(config.base_dir, Some(PathBuf::from("/opt/mover")));
        assert_eq!(config.statement_timeout, Duration::from_secs(15));
        assert_eq!(
            config.insert_sql,
            "INSERT INTO customers (id, name) VALUES (?, ?)"
        );

        fs::remove_file(config_file).expect("temp config file should be removed");
    }

    #[test]
    fn command_line_values_override_file() {
        let config_file = build_temp_config_file(BASE_CONFIG, "yaml");

        let invocation = invocation(&[
            "-c",
            path_arg(&config_file),
            "--params",
            "other.tsv",
            "--timeout",
            "0",
            "--source-password",
            "from-flag",
            "--log-level",
            "debug",
        ]);
        assert_eq!(invocation.log_level(), "debug");
        let config = invocation
            .collect_transfer_config()
            .expect("config should be created");

        assert_eq!(config.param_file, PathBuf::from("other.tsv"));
        assert_eq!(config.statement_timeout, Duration::ZERO);
        assert_eq!(config.source.password, "from-flag");

        fs::remove_file(config_file).expect("temp config file should be removed");
    }

    #[test]
    fn reads_legacy_properties_file() {
        let config_file = build_temp_config_file(
            "FROM.DB.CLASS=org.postgresql.Driver\n\
             FROM.DB.URL=jdbc:postgresql://src-db:5432/legacy\n\
             FROM.DB.QUERY=SELECT id FROM customers WHERE region = $1\n\
             FROM.DB.PARAM=regions.tsv\n\
             BASEDIR=/opt/mover\n\
             TO.DB.URL=jdbc:mysql://dst-db:3306/app\n\
             TO.DB.QUERY=INSERT INTO customers (id) VALUES (?)\n\
             DB.TIMEOUT=45\n",
            "properties",
        );

        let config = invocation(&["--config", path_arg(&config_file)])
            .collect_transfer_config()
            .expect("config should be created");

        assert_eq!(config.source.driver, DriverKind::PostgreSql);
        assert_eq!(config.target.driver, DriverKind::MySql);
        assert_eq!(config.base_dir, Some(PathBuf::from("/opt/mover")));
        assert_eq!(config.statement_timeout, Duration::from_secs(45));

        fs::remove_file(config_file).expect("temp config file should be removed");
    }

    #[test]
    fn rejects_missing_query() {
        let config_file = build_temp_config_file(
            &BASE_CONFIG.replace(
                "  query: INSERT INTO customers (id, name) VALUES (?, ?)\n",
                "",
            ),
            "yaml",
        );

        let error = invocation(&["--config", path_arg(&config_file)])
            .collect_transfer_config()
            .expect_err("insert query is required");
        assert!(error.to_string().contains("Missing target query"));

        fs::remove_file(config_file).expect("temp config file should be removed");
    }

    #[test]
    fn rejects_unknown_driver_name() {
        let config_file = build_temp_config_file(
            &BASE_CONFIG.replace("driver: mysql", "driver: db2"),
            "yaml",
        );

        let error = invocation(&["--config", path_arg(&config_file)])
            .collect_transfer_config()
            .expect_err("db2 is not available");
        assert!(format!("{error:#}").contains("Unsupported driver: db2"));

        fs::remove_file(config_file).expect("temp config file should be removed");
    }

    #[test]
    fn requires_parameter_file_from_config_or_flag() {
        let config_file = build_temp_config_file(
            &BASE_CONFIG.replace("  file: regions.tsv\n", ""),
            "yaml",
        );

        let error = invocation(&["--config", path_arg(&config_file)])
            .collect_transfer_config()
            .expect_err("parameter file is required");
        assert!(error.to_string().contains("Missing parameter file"));

        let config = invocation(&["--config", path_arg(&config_file), "-p", "cli.tsv"])
            .collect_transfer_config()
            .expect("flag should supply the parameter file");
        assert_eq!(config.param_file, PathBuf::from("cli.tsv"));

        fs::remove_file(config_file).expect("temp config file should be removed");
    }
}
