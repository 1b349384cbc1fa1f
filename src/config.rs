use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{
    error::{DfsResult, Error},
    path::RemotePath,
};

/// URL of the store a configuration targets.
pub const DEFAULT_FS: &str = "fs.default.name";
pub const USER_NAME: &str = "dfs.user.name";
pub const REPLICATION: &str = "dfs.replication";
pub const BLOCK_SIZE: &str = "dfs.blocksize";
/// Optional; defaults to `/user/<dfs.user.name>`.
pub const WORKING_DIR: &str = "fs.working.dir";

pub const DEFAULT_SCHEME: &str = "hdfs";
pub const DEFAULT_USER: &str = "hdfs";
pub const DEFAULT_REPLICATION: u32 = 3;
pub const DEFAULT_BLOCK_SIZE: u64 = 128 * 1024 * 1024;

/// Address of one remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self::with_scheme(DEFAULT_SCHEME, host, port)
    }

    pub fn with_scheme<S: Into<String>, H: Into<String>>(scheme: S, host: H, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port`
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `scheme://host:port`
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| Error::InvalidInput(format!("{url}: {why}"));

        let (scheme, authority) = url
            .split_once("://")
            .ok_or_else(|| invalid("expected scheme://host:port"))?;
        let authority = authority.trim_end_matches('/');
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;

        if scheme.is_empty() {
            return Err(invalid("empty scheme"));
        }
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port = port.parse::<u16>().map_err(|_| invalid("bad port"))?;

        Ok(Self::with_scheme(scheme, host, port))
    }
}

/// Ordered key/value settings handed to a connector.
///
/// Iteration follows insertion order; overwriting a key keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    entries: Vec<(String, String)>,
}

impl Configuration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for a store at `endpoint`.
    #[must_use]
    pub fn for_endpoint(endpoint: &Endpoint) -> Self {
        let mut config = Self::new();
        config
            .set(DEFAULT_FS, endpoint.url())
            .set(USER_NAME, DEFAULT_USER)
            .set(REPLICATION, DEFAULT_REPLICATION.to_string())
            .set(BLOCK_SIZE, DEFAULT_BLOCK_SIZE.to_string());
        config
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn endpoint(&self) -> DfsResult<Endpoint> {
        self.get(DEFAULT_FS)
            .ok_or_else(|| Error::InvalidInput(format!("{DEFAULT_FS} is not set")))?
            .parse()
    }

    pub fn working_dir(&self) -> DfsResult<RemotePath> {
        match self.get(WORKING_DIR) {
            Some(dir) => RemotePath::new(dir),
            None => RemotePath::new(&format!("/user/{}", self.get_or(USER_NAME, DEFAULT_USER))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
