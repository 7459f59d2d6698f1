//! Static registry of the services the stack is expected to run.
//!
//! The catalog is built once (from the built-in reference stack or from a
//! stack file) and then only read. Nothing in it changes while the
//! supervisor runs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type ServiceKey = String;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Core,
    Database,
    Storage,
    Messaging,
    Frontend,
    Init,
    #[default]
    Other,
}

impl ServiceCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ServiceCategory::Core => "core",
            ServiceCategory::Database => "database",
            ServiceCategory::Storage => "storage",
            ServiceCategory::Messaging => "messaging",
            ServiceCategory::Frontend => "frontend",
            ServiceCategory::Init => "init",
            ServiceCategory::Other => "other",
        }
    }
}

/// A host/port pair probed with a plain TCP connect
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TcpTarget {
    pub host: String,
    pub port: u16,
}

impl TcpTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for TcpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub key: ServiceKey,
    pub display_name: String,
    pub category: ServiceCategory,
    pub description: Option<String>,
    /// Health-check URLs, tried in order
    pub urls: Vec<String>,
    /// TCP targets, tried in order after the URLs
    pub tcp: Vec<TcpTarget>,
    /// Successful lifecycle ends in a clean exit (init jobs, migrations)
    pub one_shot: bool,
}

impl ServiceDefinition {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            category: ServiceCategory::Other,
            description: None,
            urls: Vec::new(),
            tcp: Vec::new(),
            one_shot: false,
        }
    }

    pub fn category(mut self, category: ServiceCategory) -> Self {
        self.category = category;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    pub fn tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.tcp.push(TcpTarget::new(host, port));
        self
    }

    pub fn one_shot(mut self) -> Self {
        self.one_shot = true;
        self
    }

    pub fn has_probes(&self) -> bool {
        !self.urls.is_empty() || !self.tcp.is_empty()
    }
}

/// The one service whose own HTTP health check gates the whole stack
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreService {
    pub key: ServiceKey,
    pub health_url: String,
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    services: BTreeMap<ServiceKey, ServiceDefinition>,
    core: Option<CoreService>,
}

impl Catalog {
    pub fn new(definitions: impl IntoIterator<Item = ServiceDefinition>) -> Self {
        Self {
            services: definitions
                .into_iter()
                .map(|def| (def.key.clone(), def))
                .collect(),
            core: None,
        }
    }

    pub fn with_core(mut self, key: impl Into<String>, health_url: impl Into<String>) -> Self {
        self.core = Some(CoreService {
            key: key.into(),
            health_url: health_url.into(),
        });
        self
    }

    pub fn get(&self, key: &str) -> Option<&ServiceDefinition> {
        self.services.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ServiceKey> {
        self.services.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn core(&self) -> Option<&CoreService> {
        self.core.as_ref()
    }

    pub fn is_core(&self, key: &str) -> bool {
        self.core.as_ref().is_some_and(|core| core.key == key)
    }

    pub fn is_one_shot(&self, key: &str) -> bool {
        self.get(key).is_some_and(|def| def.one_shot)
    }

    /// Display name for a key, falling back to the key itself for services
    /// the runtime reports but the catalog does not describe
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key)
            .map(|def| def.display_name.as_str())
            .unwrap_or(key)
    }

    /// The reference development stack
    pub fn builtin() -> Self {
        Self::new([
            ServiceDefinition::new("api", "Nexus API")
                .category(ServiceCategory::Core)
                .description("Platform API serving agents and the web app")
                .url("http://127.0.0.1:9879/health"),
            ServiceDefinition::new("web", "Nexus Web")
                .category(ServiceCategory::Frontend)
                .description("Web frontend")
                .url("http://127.0.0.1:3000"),
            ServiceDefinition::new("postgres", "PostgreSQL")
                .category(ServiceCategory::Database)
                .description("Relational store for users, chats and settings")
                .tcp("127.0.0.1", 5432),
            ServiceDefinition::new("fuseki", "Apache Jena Fuseki")
                .category(ServiceCategory::Database)
                .description("Triple store holding the knowledge graph")
                .url("http://127.0.0.1:3030/$/ping")
                .tcp("127.0.0.1", 3030),
            ServiceDefinition::new("qdrant", "Qdrant")
                .category(ServiceCategory::Database)
                .description("Vector store for embeddings")
                .url("http://127.0.0.1:6333/readyz"),
            ServiceDefinition::new("redis", "Redis")
                .category(ServiceCategory::Storage)
                .description("Cache and session store")
                .tcp("127.0.0.1", 6379),
            ServiceDefinition::new("minio", "MinIO")
                .category(ServiceCategory::Storage)
                .description("S3-compatible object storage")
                .url("http://127.0.0.1:9000/minio/health/live"),
            ServiceDefinition::new("rabbitmq", "RabbitMQ")
                .category(ServiceCategory::Messaging)
                .description("Message broker")
                .url("http://127.0.0.1:15672")
                .tcp("127.0.0.1", 5672),
            ServiceDefinition::new("migrations", "Database migrations")
                .category(ServiceCategory::Init)
                .description("Applies schema migrations, then exits")
                .one_shot(),
        ])
        .with_core("api", "http://127.0.0.1:9879/health")
    }
}
