//! Server instances and the registry that resolves them.
//!
//! A [`Server`] owns everything statements share process-wide: the admission
//! gate, the statement counters, the id generators and the monitor. Servers
//! are looked up through a [`ServerRegistry`] the embedding application owns.

use crate::config::EngineConfig;
use crate::error::{ConfigError, RegistryError};
use crate::monitor::{Monitor, TracingMonitor};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::counters::StatementCounters;
use super::gate::QueryGate;

/// Id of the server [`Server::standalone`] creates.
pub const STANDALONE_SERVER_ID: &str = "standalone";

/// Shared state for every statement run against one engine instance.
pub struct Server {
    id: String,
    config: EngineConfig,
    gate: QueryGate,
    counters: StatementCounters,
    monitor: Arc<dyn Monitor>,
    statement_ids: AtomicU64,
    execution_ids: AtomicU64,
}

impl Server {
    /// Create a server.
    ///
    /// # Errors
    /// Returns `ConfigError` if the configuration does not validate.
    pub fn new(
        id: impl Into<String>,
        config: EngineConfig,
        monitor: Arc<dyn Monitor>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Arc::new(Self::with_config(id.into(), config, monitor)))
    }

    /// Server with the default configuration that reports events to `tracing`.
    pub fn standalone() -> Arc<Self> {
        Arc::new(Self::with_config(
            STANDALONE_SERVER_ID.to_string(),
            EngineConfig::default(),
            Arc::new(TracingMonitor),
        ))
    }

    fn with_config(id: String, config: EngineConfig, monitor: Arc<dyn Monitor>) -> Self {
        let gate =
            QueryGate::new(config.query_limit).with_admission_timeout(config.admission_timeout());
        info!(
            server_id = %id,
            query_limit = config.query_limit,
            "server created"
        );
        Self {
            id,
            config,
            gate,
            counters: StatementCounters::new(),
            monitor,
            statement_ids: AtomicU64::new(0),
            execution_ids: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gate(&self) -> &QueryGate {
        &self.gate
    }

    pub fn counters(&self) -> &StatementCounters {
        &self.counters
    }

    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }

    /// Next statement id. Ids are unique and increasing per server.
    pub fn next_statement_id(&self) -> u64 {
        self.statement_ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn next_execution_id(&self) -> u64 {
        self.execution_ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Stop admitting statements.
    pub fn shutdown(&self) {
        info!(server_id = %self.id, "server shutting down");
        self.gate.shutdown();
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("gate", &self.gate)
            .finish()
    }
}

/// Resolves server instances by id.
pub struct ServerRegistry {
    static_server: Arc<Server>,
    servers: RwLock<HashMap<String, Arc<Server>>>,
}

impl ServerRegistry {
    /// Create a registry whose fallback server is `static_server`.
    pub fn new(static_server: Arc<Server>) -> Self {
        Self {
            static_server,
            servers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a server under its id.
    ///
    /// # Errors
    /// Returns `RegistryError::DuplicateServer` if the id is taken.
    pub fn register(&self, server: Arc<Server>) -> Result<(), RegistryError> {
        let mut servers = self.servers.write();
        if servers.contains_key(server.id()) || server.id() == self.static_server.id() {
            return Err(RegistryError::DuplicateServer(server.id().to_string()));
        }
        servers.insert(server.id().to_string(), server);
        Ok(())
    }

    /// Remove a server from the registry.
    pub fn deregister(&self, id: &str) -> Option<Arc<Server>> {
        self.servers.write().remove(id)
    }

    /// Look up a server. `None` yields the static server.
    ///
    /// # Errors
    /// Returns `RegistryError::UnknownServer` if no server has the given id.
    pub fn server_for_id(&self, id: Option<&str>) -> Result<Arc<Server>, RegistryError> {
        match id {
            None => Ok(Arc::clone(&self.static_server)),
            Some(id) if id == self.static_server.id() => Ok(Arc::clone(&self.static_server)),
            Some(id) => self
                .servers
                .read()
                .get(id)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownServer(id.to_string())),
        }
    }

    pub fn static_server(&self) -> &Arc<Server> {
        &self.static_server
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new(Server::standalone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(id: &str) -> Arc<Server> {
        Server::new(id, EngineConfig::default(), Arc::new(TracingMonitor)).unwrap()
    }

    #[test]
    fn test_server_uses_configured_limit() {
        let config = EngineConfig::builder().query_limit(3).build().unwrap();
        let server = Server::new("s1", config, Arc::new(TracingMonitor)).unwrap();

        assert_eq!(server.gate().capacity(), 3);
        assert_eq!(server.gate().available_permits(), 3);
    }

    #[test]
    fn test_server_rejects_invalid_config() {
        let config = EngineConfig {
            query_limit: 0,
            ..EngineConfig::default()
        };
        assert!(Server::new("s1", config, Arc::new(TracingMonitor)).is_err());
    }

    #[test]
    fn test_statement_ids_increase() {
        let server = Server::standalone();
        let first = server.next_statement_id();
        let second = server.next_statement_id();
        assert!(second > first);
    }

    #[test]
    fn test_registry_resolves_static_server() {
        let registry = ServerRegistry::default();
        let server = registry.server_for_id(None).unwrap();
        assert_eq!(server.id(), STANDALONE_SERVER_ID);
    }

    #[test]
    fn test_registry_resolves_registered_server() {
        let registry = ServerRegistry::default();
        registry.register(server("a")).unwrap();

        assert_eq!(registry.server_for_id(Some("a")).unwrap().id(), "a");
        assert_eq!(
            registry.register(server("a")),
            Err(RegistryError::DuplicateServer("a".to_string()))
        );
    }

    #[test]
    fn test_registry_unknown_id_is_error() {
        let registry = ServerRegistry::default();
        assert_eq!(
            registry.server_for_id(Some("missing")).unwrap_err(),
            RegistryError::UnknownServer("missing".to_string())
        );
    }

    #[test]
    fn test_registry_deregister() {
        let registry = ServerRegistry::default();
        registry.register(server("b")).unwrap();
        assert!(registry.deregister("b").is_some());
        assert!(registry.server_for_id(Some("b")).is_err());
    }
}
