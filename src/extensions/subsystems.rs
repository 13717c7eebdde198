//! Subsystem descriptor handles.
//!
//! Each handle carries the validated settings a concrete driver needs to
//! connect. Drivers themselves live outside this crate; the handles only
//! record *that* a subsystem was wired and *with what*.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::extensions::cors::CorsPolicy;

/// Language and timezone settings, always wired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locale {
    pub languages: Vec<String>,
    pub default_language: String,
    pub timezone: String,
}

/// Request-forgery protection bound to the application secret.
#[derive(Clone)]
pub struct CsrfGuard {
    secret: String,
}

impl CsrfGuard {
    pub(crate) fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Outbound mail transport settings.
#[derive(Clone, PartialEq, Eq)]
pub struct Mailer {
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: Option<String>,
    pub(crate) password: Option<String>,
    pub sender: String,
    pub subject_prefix: String,
}

impl Mailer {
    pub const DEFAULT_SERVER: &'static str = "localhost";
    pub const DEFAULT_PORT: u16 = 25;
    pub const DEFAULT_SENDER: &'static str = "Mio System Administrator <admin@example.com>";
    pub const DEFAULT_SUBJECT_PREFIX: &'static str = "[Mio System]";

    /// Whether credentials are configured. Sending without them is left to
    /// the transport to reject at runtime.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for Mailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailer")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sender", &self.sender)
            .field("subject_prefix", &self.subject_prefix)
            .finish()
    }
}

/// Document store connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStore {
    pub db: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub connect: bool,
}

impl DocumentStore {
    pub const DEFAULT_PORT: u16 = 27017;
}

/// Relational store connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalStore {
    pub url: Url,
    pub echo: bool,
}

/// Task queue configuration, assembled key by key.
///
/// Contains `broker` and `backend`, plus only those optional keys that
/// were present in the profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskQueueConfig(BTreeMap<String, toml::Value>);

impl TaskQueueConfig {
    pub(crate) fn insert(&mut self, key: &str, value: toml::Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Deferred task queue descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskQueue {
    /// Application name tasks are registered under.
    pub app_name: String,
    pub config: TaskQueueConfig,
}

/// In-memory keyed store descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedStore {
    pub url: Url,
    pub key_prefix: String,
}

impl KeyedStore {
    /// Namespaced key for `key`.
    pub fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Simple,
    Redis(Url),
}

/// Response caching descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCache {
    pub backend: CacheBackend,
    pub default_timeout: Duration,
}

/// Every optional subsystem slot, filled during wiring.
#[derive(Debug, Clone, Default)]
pub struct Subsystems {
    pub locale: Option<Locale>,
    pub csrf: Option<CsrfGuard>,
    pub mail: Option<Mailer>,
    pub document_store: Option<DocumentStore>,
    pub relational: Option<RelationalStore>,
    pub task_queue: Option<TaskQueue>,
    pub keyed_store: Option<KeyedStore>,
    pub cors: Option<CorsPolicy>,
    pub cache: Option<ResponseCache>,
}
