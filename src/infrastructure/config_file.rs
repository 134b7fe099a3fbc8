use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result, bail};
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::domain::driver_kind::DriverKind;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid"));

/// Settings for one run as written in the config file.
///
/// YAML files use this layout directly. `.properties` files keep the key
/// names of the JDBC mover (`FROM.DB.URL`, `TO.DB.QUERY`, `DB.TIMEOUT`, ...)
/// and are mapped onto it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoverConfig {
    pub source: EndpointConfig,
    pub target: EndpointConfig,
    #[serde(default)]
    pub params: ParamsConfig,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub driver: Option<DriverKind>,
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamsConfig {
    pub file: Option<PathBuf>,
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct LegacyProperties {
    #[serde(rename = "FROM.DB.CLASS")]
    from_driver: Option<DriverKind>,
    #[serde(rename = "FROM.DB.URL")]
    from_url: String,
    #[serde(rename = "FROM.DB.USER")]
    from_user: Option<String>,
    #[serde(rename = "FROM.DB.PASSWORD")]
    from_password: Option<String>,
    #[serde(rename = "FROM.DB.QUERY")]
    from_query: Option<String>,
    #[serde(rename = "FROM.DB.PARAM")]
    param_file: Option<PathBuf>,
    #[serde(rename = "BASEDIR")]
    base_dir: Option<PathBuf>,
    #[serde(rename = "TO.DB.CLASS")]
    to_driver: Option<DriverKind>,
    #[serde(rename = "TO.DB.URL")]
    to_url: String,
    #[serde(rename = "TO.DB.USER")]
    to_user: Option<String>,
    #[serde(rename = "TO.DB.PASSWORD")]
    to_password: Option<String>,
    #[serde(rename = "TO.DB.QUERY")]
    to_query: Option<String>,
    #[serde(rename = "DB.TIMEOUT")]
    timeout: Option<TextSeconds>,
}

/// Properties values are always text, so `DB.TIMEOUT` arrives as `"30"`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(try_from = "String")]
struct TextSeconds(u64);

impl TryFrom<String> for TextSeconds {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.trim()
            .parse()
            .map(TextSeconds)
            .map_err(|_| format!("DB.TIMEOUT must be whole seconds, got `{raw}`"))
    }
}

impl From<LegacyProperties> for MoverConfig {
    fn from(legacy: LegacyProperties) -> Self {
        MoverConfig {
            source: EndpointConfig {
                driver: legacy.from_driver,
                url: legacy.from_url,
                user: legacy.from_user,
                password: legacy.from_password,
                query: legacy.from_query,
            },
            target: EndpointConfig {
                driver: legacy.to_driver,
                url: legacy.to_url,
                user: legacy.to_user,
                password: legacy.to_password,
                query: legacy.to_query,
            },
            params: ParamsConfig {
                file: legacy.param_file,
                base_dir: legacy.base_dir,
            },
            timeout_secs: legacy.timeout.map(|seconds| seconds.0),
        }
    }
}

/// Reads a `.properties` file with the legacy key names, anything else as YAML.
pub fn load(path: &Path) -> Result<MoverConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Unable to read config file {}", path.display()))?;

    let is_properties = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("properties"));
    let parsed = if is_properties {
        parse_properties(&content)
    } else {
        parse_yaml(&content)
    };
    parsed.with_context(|| format!("Invalid config file {}", path.display()))
}

/// `${VAR}` references are replaced from the environment before parsing.
pub fn parse_yaml(content: &str) -> Result<MoverConfig> {
    let substituted = substitute_env_vars(content)?;
    serde_yaml::from_str(&substituted).context("Failed to parse config YAML")
}

pub fn parse_properties(content: &str) -> Result<MoverConfig> {
    let entries =
        java_properties::read(content.as_bytes()).context("Failed to parse properties")?;

    // Keys are matched case-insensitively; blank values count as unset.
    let mapping = entries
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| {
            (
                serde_yaml::Value::String(key.trim().to_ascii_uppercase()),
                serde_yaml::Value::String(value),
            )
        })
        .collect::<serde_yaml::Mapping>();

    let legacy: LegacyProperties = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
        .context("Failed to read properties keys")?;
    Ok(legacy.into())
}

fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let substituted = ENV_VAR.replace_all(input, |captures: &Captures| {
        env::var(&captures[1]).unwrap_or_else(|_| {
            missing.push(captures[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        bail!("Missing environment variable(s): {}", missing.join(", "));
    }
    Ok(substituted.into_owned())
}
