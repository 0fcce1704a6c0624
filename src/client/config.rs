use std::time::Duration;

use crate::core::error::{OdmError, Result};

/// How the factory authenticates new connections.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Anonymous,
    Simple {
        bind_dn: String,
        password: String,
    },
}

/// Connection settings for a session factory.
///
/// Built with chained setters; `validate` is called by the factory before
/// the first connection is opened.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    url: String,
    auth: AuthMode,
    pool_min: usize,
    pool_max: usize,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ldap://localhost:389".to_string(),
            auth: AuthMode::Anonymous,
            pool_min: 1,
            pool_max: 8,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_simple_auth(
        mut self,
        bind_dn: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = AuthMode::Simple {
            bind_dn: bind_dn.into(),
            password: password.into(),
        };
        self
    }

    pub fn with_pool_size(mut self, min: usize, max: usize) -> Self {
        self.pool_min = min;
        self.pool_max = max;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn auth(&self) -> &AuthMode {
        &self.auth
    }

    pub fn pool_min(&self) -> usize {
        self.pool_min
    }

    pub fn pool_max(&self) -> usize {
        self.pool_max
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(OdmError::Session("connection url must not be empty".into()));
        }
        if !self.url.starts_with("ldap://") && !self.url.starts_with("ldaps://") {
            return Err(OdmError::Session(format!(
                "unsupported connection url scheme: {}",
                self.url
            )));
        }
        if self.pool_min > self.pool_max {
            return Err(OdmError::Session(format!(
                "pool_min ({}) must not exceed pool_max ({})",
                self.pool_min, self.pool_max
            )));
        }
        if self.pool_max == 0 {
            return Err(OdmError::Session("pool_max must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ConnectionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = ConnectionConfig::new("ldaps://dir.example.com:636")
            .with_simple_auth("cn=admin,o=example", "secret")
            .with_pool_size(2, 16)
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(config.url(), "ldaps://dir.example.com:636");
        assert_eq!(config.pool_max(), 16);
        assert!(matches!(config.auth(), AuthMode::Simple { .. }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_settings() {
        assert!(ConnectionConfig::new("").validate().is_err());
        assert!(ConnectionConfig::new("http://x").validate().is_err());
        assert!(
            ConnectionConfig::default()
                .with_pool_size(4, 2)
                .validate()
                .is_err()
        );
    }
}
