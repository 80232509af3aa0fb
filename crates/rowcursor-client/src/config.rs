//! Session configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::driver::{DriverCompletion, OdbcVersion};
use crate::error::{Error, Result};

/// Everything needed to open a [`Session`](crate::Session)
///
/// Loadable from YAML:
///
/// ```yaml
/// connection_string: "DRIVER=MariaDB Unicode;SERVER=localhost;DATABASE=bank"
/// user: app
/// password: secret
/// completion: complete
/// odbc_version: "3"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Driver connection string without credentials
    pub connection_string: String,
    pub user: String,
    pub password: String,
    /// How the driver may complete missing connection parameters
    pub completion: DriverCompletion,
    /// Protocol version set on the environment handle
    pub odbc_version: OdbcVersion,
}

impl SessionConfig {
    pub fn new(connection_string: &str, user: &str, password: &str) -> Self {
        Self {
            connection_string: connection_string.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection_string.trim().is_empty() {
            return Err(Error::Config("connection_string must not be empty".to_string()));
        }
        let carries_credentials = self.connection_string.split(';').any(|segment| {
            let key = segment.split('=').next().unwrap_or("").trim();
            key.eq_ignore_ascii_case("UID") || key.eq_ignore_ascii_case("PWD")
        });
        if carries_credentials {
            return Err(Error::Config(
                "connection_string must not contain UID or PWD; use user and password".to_string(),
            ));
        }
        Ok(())
    }

    /// The string handed to the driver: `<connection_string>;UID=<user>;PWD=<password>`
    pub fn target_string(&self) -> String {
        format!(
            "{};UID={};PWD={}",
            self.connection_string, self.user, self.password
        )
    }

    /// The target string with the password masked, for logging
    pub fn redacted_target(&self) -> String {
        format!("{};UID={};PWD=***", self.connection_string, self.user)
    }
}
