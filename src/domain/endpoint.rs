use std::fmt;

use crate::domain::{
    driver_kind::{DriverKind, strip_jdbc_prefix},
    error::SessionError,
};

/// Which side of the transfer a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseRole {
    Source,
    Target,
}

impl DatabaseRole {
    pub fn as_str(self) -> &'static str {
        match self {
            DatabaseRole::Source => "source",
            DatabaseRole::Target => "target",
        }
    }
}

impl fmt::Display for DatabaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection descriptor for one database.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseEndpoint {
    pub driver: DriverKind,
    pub url: String,
    pub user: String,
    pub password: String,
}

impl DatabaseEndpoint {
    pub fn new(
        driver: DriverKind,
        url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            url: url.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// URL with any `jdbc:` prefix removed and, for network drivers, the
    /// configured credentials filled in.
    pub fn connect_url(&self) -> Result<String, SessionError> {
        let bare_url = strip_jdbc_prefix(&self.url);
        if !self.driver.accepts_credentials() || self.user.is_empty() {
            return Ok(bare_url.to_string());
        }

        let mut parsed = url::Url::parse(bare_url)
            .map_err(|error| SessionError::InvalidUrl(format!("{}: {error}", self.redacted_url())))?;
        let credentials_rejected = || {
            SessionError::InvalidUrl(format!("{} cannot carry credentials", self.redacted_url()))
        };
        parsed
            .set_username(&self.user)
            .map_err(|()| credentials_rejected())?;
        if !self.password.is_empty() {
            parsed
                .set_password(Some(&self.password))
                .map_err(|()| credentials_rejected())?;
        }
        Ok(parsed.to_string())
    }

    pub fn redacted_url(&self) -> String {
        let bare_url = strip_jdbc_prefix(&self.url);
        match url::Url::parse(bare_url) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            }
            Err(_) => bare_url.to_string(),
        }
    }
}

impl fmt::Debug for DatabaseEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseEndpoint")
            .field("driver", &self.driver)
            .field("url", &self.redacted_url())
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl fmt::Display for DatabaseEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} / ***", self.redacted_url(), self.user)
    }
}
