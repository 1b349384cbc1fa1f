mod session;
mod walk;

pub use session::Session;
pub use walk::Walk;

use std::{collections::HashMap, sync::Arc};

use crate::{
    config::{self, Configuration, Endpoint, DEFAULT_FS},
    error::{DfsResult, Error},
    report::{LogReporter, Outcome, Reporter},
    store::{Connector, LocalConnector, MemoryConnector},
};

/// Entry point: resolves endpoints into [`Session`]s.
///
/// Connectors are registered per URL scheme; every session opened by a client
/// reports its outcomes to the client's [`Reporter`].
pub struct FileStoreClient {
    connectors: HashMap<String, Arc<dyn Connector>>,
    reporter: Arc<dyn Reporter>,
}

impl FileStoreClient {
    /// A client without connectors, reporting through `log`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
            reporter: Arc::new(LogReporter),
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Serves `scheme` with `connector`, replacing any previous one.
    #[must_use]
    pub fn register<S, C>(mut self, scheme: S, connector: C) -> Self
    where
        S: Into<String>,
        C: Connector + 'static,
    {
        let _ = self.connectors.insert(scheme.into(), Arc::new(connector));
        self
    }

    /// Like [`Self::register`], for a connector the caller keeps a handle to.
    #[must_use]
    pub fn register_shared<S: Into<String>>(mut self, scheme: S, connector: Arc<dyn Connector>) -> Self {
        let _ = self.connectors.insert(scheme.into(), connector);
        self
    }

    /// Connects to `hdfs://host:port` with default settings.
    pub async fn connect<H: Into<String>>(&self, host: H, port: u16) -> DfsResult<Session> {
        self.connect_endpoint(&Endpoint::new(host, port)).await
    }

    pub async fn connect_endpoint(&self, endpoint: &Endpoint) -> DfsResult<Session> {
        self.connect_with(Configuration::for_endpoint(endpoint)).await
    }

    /// Connects using `config`, whose `fs.default.name` names the endpoint.
    pub async fn connect_with(&self, config: Configuration) -> DfsResult<Session> {
        let target = config.get_or(DEFAULT_FS, "<unset>").to_owned();

        let result = self.open(config).await;
        match &result {
            Ok(_) => self.reporter.report("connect", &target, Outcome::Done),
            Err(err) => self.reporter.report("connect", &target, Outcome::Failed(err)),
        }
        result
    }

    async fn open(&self, config: Configuration) -> DfsResult<Session> {
        let endpoint = config
            .endpoint()
            .map_err(|err| Error::connection(config.get_or(DEFAULT_FS, "<unset>"), err))?;

        let connector = self.connectors.get(&endpoint.scheme).ok_or_else(|| {
            Error::connection(
                &endpoint,
                Error::Unsupported(format!("no connector for scheme {}", endpoint.scheme)),
            )
        })?;

        debug!("connecting to {endpoint}");
        let store = connector
            .connect(&config)
            .await
            .map_err(|err| Error::connection(&endpoint, err))?;

        let url = endpoint.url();
        Session::new(store, endpoint, self.reporter.clone())
            .map_err(|err| Error::connection(url, err))
    }
}

impl Default for FileStoreClient {
    /// Serves `hdfs` from an empty [`MemoryConnector`] and `file` from the
    /// current directory.
    fn default() -> Self {
        Self::new()
            .register(config::DEFAULT_SCHEME, MemoryConnector::new())
            .register(crate::store::local::SCHEME, LocalConnector::new("."))
    }
}
