//! DSQL endpoint resolution.
//!
//! Turns a connection string or loose options into a [`WsConfig`]:
//! expands cluster IDs into full hostnames, derives the region, fills
//! gaps from the environment and stamps the application name.
//!
//! # Hostname Format
//!
//! ```text
//! <cluster-id>.dsql[-suffix].<region>.on.aws
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

use super::options::{ConnectionId, DEFAULT_DATABASE, DEFAULT_PORT, DEFAULT_USER, WsConfig};

// ============================================================================
// Constants
// ============================================================================

const PRE_REGION_HOST_PATTERN: &str = ".dsql.";
const POST_REGION_HOST_PATTERN: &str = ".on.aws";

/// Connector identity reported as `application_name`.
pub const APPLICATION_NAME: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

static DSQL_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[^.]+\.dsql(?:-[^.]+)?\.(?P<region>[a-z0-9-]+)\.on\.aws\.?$")
        .expect("DSQL hostname pattern is valid")
});

// ============================================================================
// Hostname Helpers
// ============================================================================

/// Extracts the region from a DSQL hostname.
///
/// # Errors
///
/// Returns [`Error::InvalidHostname`] if `host` is empty or not a DSQL
/// endpoint.
pub fn parse_region(host: &str) -> Result<String> {
    DSQL_HOST
        .captures(host)
        .and_then(|caps| caps.name("region"))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::invalid_hostname(host))
}

/// Returns `true` if `host` is a bare cluster ID.
#[inline]
#[must_use]
pub fn is_cluster_id(host: &str) -> bool {
    !host.contains('.')
}

/// Builds `<cluster-id>.dsql.<region>.on.aws`.
#[must_use]
pub fn build_hostname(cluster_id: &str, region: &str) -> String {
    format!("{cluster_id}{PRE_REGION_HOST_PATTERN}{region}{POST_REGION_HOST_PATTERN}")
}

/// Builds the `application_name`, optionally prefixed by an ORM name.
///
/// Prefixes containing `/` or consisting only of whitespace are ignored.
#[must_use]
pub fn build_application_name(orm_prefix: Option<&str>) -> String {
    match orm_prefix.map(str::trim) {
        Some(prefix) if !prefix.is_empty() && !prefix.contains('/') => {
            format!("{prefix}:{APPLICATION_NAME}")
        }
        _ => APPLICATION_NAME.to_string(),
    }
}

// ============================================================================
// DsqlOptions
// ============================================================================

/// Connection options before endpoint resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DsqlOptions {
    /// Full hostname or bare cluster ID.
    pub host: Option<String>,
    /// User name.
    pub user: Option<String>,
    /// Database name.
    pub database: Option<String>,
    /// Region, required only for cluster IDs without `AWS_REGION`.
    pub region: Option<String>,
    /// Enables liveness probing.
    pub connection_check: bool,
    /// Identifier passed to the close callback.
    pub connection_id: Option<ConnectionId>,
    /// ORM name prepended to the application name.
    pub orm_prefix: Option<String>,
}

impl DsqlOptions {
    /// Creates empty options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `postgres://user@host/database`.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the string is not a URL
    /// - [`Error::Config`] for multi-host strings or bad percent-encoding
    pub fn from_url(connection_string: &str) -> Result<Self> {
        let parsed = Url::parse(connection_string)?;

        let host = parsed.host_str().unwrap_or_default();
        if host.contains(',') {
            return Err(Error::config(
                "Multi-host connection strings are not supported for Aurora DSQL",
            ));
        }

        let user = decode(parsed.username())?;
        let database = decode(parsed.path().trim_start_matches('/'))?;

        Ok(Self {
            host: non_empty(host.to_string()),
            user: non_empty(user),
            database: non_empty(database),
            ..Self::default()
        })
    }

    /// Sets the host or cluster ID.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the user.
    #[inline]
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the database.
    #[inline]
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Sets the region.
    #[inline]
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Enables liveness probing.
    #[inline]
    #[must_use]
    pub fn with_connection_check(mut self, enabled: bool) -> Self {
        self.connection_check = enabled;
        self
    }

    /// Sets the connection identifier.
    #[inline]
    #[must_use]
    pub fn with_connection_id(mut self, id: ConnectionId) -> Self {
        self.connection_id = Some(id);
        self
    }

    /// Sets the ORM prefix for the application name.
    #[inline]
    #[must_use]
    pub fn with_orm_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.orm_prefix = Some(prefix.into());
        self
    }

    /// Resolves against the process environment.
    ///
    /// # Errors
    ///
    /// See [`DsqlOptions::resolve_with_env`].
    pub fn resolve(self) -> Result<WsConfig> {
        self.resolve_with_env(|key| std::env::var(key).ok())
    }

    /// Resolves using `lookup` for environment fallbacks.
    ///
    /// | Field | Fallbacks |
    /// |-------|-----------|
    /// | host | `PGHOST` |
    /// | user | `PGUSERNAME`, `USER`, `admin` |
    /// | database | `PGDATABASE`, `postgres` |
    /// | region | parsed from host, `AWS_REGION`, `AWS_DEFAULT_REGION` |
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no host is available
    /// - [`Error::MissingRegion`] if a cluster ID has no region
    /// - [`Error::InvalidHostname`] if a full hostname has no parseable region
    pub fn resolve_with_env<F>(self, lookup: F) -> Result<WsConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).and_then(non_empty);

        let host = self
            .host
            .and_then(non_empty)
            .or_else(|| env("PGHOST"))
            .ok_or_else(|| Error::config("Hostname is required"))?;

        let user = self
            .user
            .and_then(non_empty)
            .or_else(|| env("PGUSERNAME"))
            .or_else(|| env("USER"))
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        let database = self
            .database
            .and_then(non_empty)
            .or_else(|| env("PGDATABASE"))
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let region = self.region.and_then(non_empty);

        let host = if is_cluster_id(&host) {
            let region = region
                .or_else(|| env("AWS_REGION"))
                .or_else(|| env("AWS_DEFAULT_REGION"))
                .ok_or_else(|| Error::missing_region(host.as_str()))?;
            build_hostname(&host, &region)
        } else {
            if region.is_none() {
                parse_region(&host)?;
            }
            host
        };

        debug!(%host, %user, %database, "Resolved DSQL endpoint");

        let mut config = WsConfig::new(host)
            .with_port(DEFAULT_PORT)
            .with_user(user)
            .with_database(database)
            .with_connection_check(self.connection_check)
            .with_application_name(build_application_name(self.orm_prefix.as_deref()));
        config.connection_id = self.connection_id;

        Ok(config)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn decode(value: &str) -> Result<String> {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .map_err(|e| Error::config(format!("Invalid percent-encoding: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
