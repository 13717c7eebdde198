//! Configuration profiles.
//!
//! # Data Flow
//! ```text
//! struct defaults
//!     → [base] table          (profiles.toml, or built-in)
//!     → environment overlay   (SECRET_KEY, MIO_*_ENABLE, MIO_MAIL_*, ...)
//!     → [profiles.<name>]     (profile-specific overrides)
//!     → ProfileSettings (typed, immutable)
//! ```
//!
//! # Design Decisions
//! - Tables are deep-merged; scalars and arrays are replaced
//! - Profile names are case-insensitive (stored lower-case)
//! - `default` is an alias for the catalog's `default_profile`
//! - Without a `profiles.toml` the built-in development/testing/production
//!   catalog is used

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::env::{parse_flag, Environment, DEFAULT_TIMEZONE};
use crate::config::path_guard::{PathGuard, ResolvedPath};

/// File name of the optional profile catalog inside the selector directory.
pub const PROFILES_FILE: &str = "profiles.toml";

/// Alias resolved to the catalog's default profile.
pub const DEFAULT_PROFILE_ALIAS: &str = "default";

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("unknown profile `{name}` (available: {available})")]
    Unknown { name: String, available: String },

    #[error("profile catalog {path} is invalid: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Typed settings of one profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileSettings {
    pub debug: bool,
    pub testing: bool,
    /// Application secret, required by request-forgery protection.
    pub secret_key: Option<String>,
    pub languages: Vec<String>,
    pub default_language: String,
    pub timezone: String,
    pub mail: MailSettings,
    pub document_store: DocumentStoreSettings,
    pub relational: RelationalSettings,
    pub task_queue: TaskQueueSettings,
    pub keyed_store: KeyedStoreSettings,
    pub cors: CorsSettings,
    pub cache: CacheSettings,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            debug: false,
            testing: false,
            secret_key: None,
            languages: vec!["zh-CN".to_string()],
            default_language: "zh-CN".to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            mail: MailSettings::default(),
            document_store: DocumentStoreSettings::default(),
            relational: RelationalSettings::default(),
            task_queue: TaskQueueSettings::default(),
            keyed_store: KeyedStoreSettings::default(),
            cors: CorsSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

/// Outbound mail transport. Unset server details fall back to the
/// transport's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MailSettings {
    pub enabled: bool,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sender: Option<String>,
    pub subject_prefix: Option<String>,
}

/// Document store connection settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DocumentStoreSettings {
    pub enabled: bool,
    pub db: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connect eagerly at startup instead of on first use.
    pub connect: bool,
}

/// Relational store settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RelationalSettings {
    pub enabled: bool,
    pub url: Option<String>,
    pub echo: bool,
}

/// Deferred task queue settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskQueueSettings {
    pub enabled: bool,
    pub broker_url: Option<String>,
    pub backend_url: Option<String>,
    pub result_backend: Option<String>,
    pub result_persistent: Option<bool>,
    pub result_exchange: Option<String>,
    pub result_exchange_type: Option<String>,
    pub broker_use_ssl: Option<toml::Value>,
}

/// In-memory keyed store settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyedStoreSettings {
    pub enabled: bool,
    pub url: Option<String>,
    pub key_prefix: String,
}

impl Default for KeyedStoreSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            key_prefix: "MIO".to_string(),
        }
    }
}

/// Cross-origin resource sharing settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsSettings {
    pub enabled: bool,
    /// Resource pattern → policy. Patterns are regular expressions matched
    /// against the start of the request path. Replaced as a whole, never merged
    /// with the default `{"/*": {origins = "*"}}`.
    pub resources: BTreeMap<String, CorsResource>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            resources: BTreeMap::from([(
                "/*".to_string(),
                CorsResource {
                    origins: Origins::One("*".to_string()),
                },
            )]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CorsResource {
    pub origins: Origins,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Origins {
    One(String),
    Many(Vec<String>),
}

impl Origins {
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Origins::One(o) => o == "*" || o == origin,
            Origins::Many(list) => list.iter().any(|o| o == "*" || o == origin),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        match self {
            Origins::One(o) => o == "*",
            Origins::Many(list) => list.iter().any(|o| o == "*"),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// `simple` (in-process) or `redis`.
    pub kind: String,
    pub redis_url: Option<String>,
    pub default_timeout_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: "simple".to_string(),
            redis_url: None,
            default_timeout_secs: 300,
        }
    }
}

/// The active profile: a name bound to its settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigProfile {
    /// Requested name, lower-cased (may be `default`).
    pub name: String,
    /// Catalog entry the name resolved to.
    pub resolved: String,
    pub settings: ProfileSettings,
}

impl ConfigProfile {
    pub fn is_production(&self) -> bool {
        self.resolved == "production"
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default = "default_profile_name")]
    default_profile: String,
    #[serde(default)]
    base: toml::Table,
    #[serde(default)]
    profiles: BTreeMap<String, toml::Table>,
}

fn default_profile_name() -> String {
    "development".to_string()
}

/// Named profiles available to a deployment.
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    default_profile: String,
    base: toml::Table,
    profiles: BTreeMap<String, toml::Table>,
}

impl ProfileCatalog {
    /// Load `profiles.toml` from the selector directory, or fall back to the
    /// built-in catalog when the file is absent.
    pub fn load(guard: &PathGuard, config_dir: &ResolvedPath) -> Result<Self, ProfileError> {
        let path = guard
            .resolve(config_dir.join(PROFILES_FILE))
            .map_err(|e| ProfileError::Invalid {
                path: config_dir.join(PROFILES_FILE),
                reason: e.to_string(),
            })?;
        if !path.is_file() {
            tracing::debug!(dir = %config_dir, "No profile catalog, using built-in profiles");
            return Ok(Self::builtin());
        }

        let invalid = |reason: String| ProfileError::Invalid {
            path: path.to_path_buf(),
            reason,
        };
        let content = fs::read_to_string(&path).map_err(|e| invalid(e.to_string()))?;
        let catalog = Self::parse(&content).map_err(invalid)?;
        tracing::debug!(
            path = %path,
            profiles = ?catalog.names(),
            "Profile catalog loaded"
        );
        Ok(catalog)
    }

    /// Parse catalog text.
    pub fn parse(content: &str) -> Result<Self, String> {
        let raw: RawCatalog = toml::from_str(content).map_err(|e| e.to_string())?;
        let catalog = Self {
            default_profile: raw.default_profile.to_lowercase(),
            base: raw.base,
            profiles: raw
                .profiles
                .into_iter()
                .map(|(name, table)| (name.to_lowercase(), table))
                .collect(),
        };
        if !catalog.profiles.contains_key(&catalog.default_profile) {
            return Err(format!(
                "default_profile `{}` is not defined",
                catalog.default_profile
            ));
        }
        Ok(catalog)
    }

    /// The development/testing/production catalog used without a file.
    pub fn builtin() -> Self {
        let shared = || {
            let mut table: toml::Table = toml::from_str(
                r#"
                [document_store]
                db = "db_name"
                host = "localhost"
                username = "username"
                password = "password"
                connect = false

                [keyed_store]
                url = "redis://localhost:6379/0"

                [cache]
                kind = "simple"
                redis_url = "redis://localhost:6379/0"

                [task_queue]
                broker_url = "redis://localhost:6379/0"
                backend_url = "redis://localhost:6379/0"
                "#,
            )
            .unwrap_or_default();
            table.insert("debug".into(), toml::Value::Boolean(false));
            table
        };

        let mut development = shared();
        development.insert("debug".into(), toml::Value::Boolean(true));
        let mut testing = shared();
        testing.insert("testing".into(), toml::Value::Boolean(true));
        let production = shared();

        Self {
            default_profile: default_profile_name(),
            base: toml::Table::new(),
            profiles: BTreeMap::from([
                ("development".to_string(), development),
                ("testing".to_string(), testing),
                ("production".to_string(), production),
            ]),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn default_profile(&self) -> &str {
        &self.default_profile
    }

    /// Bind a profile by name (`None` means `default`).
    pub fn bind(&self, name: Option<&str>, env: &Environment) -> Result<ConfigProfile, ProfileError> {
        let requested = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_PROFILE_ALIAS)
            .to_lowercase();
        let resolved = if requested == DEFAULT_PROFILE_ALIAS {
            self.default_profile.clone()
        } else {
            requested.clone()
        };

        let profile_table = self
            .profiles
            .get(&resolved)
            .ok_or_else(|| ProfileError::Unknown {
                name: requested.clone(),
                available: self.names().join(", "),
            })?;

        let mut merged = self.base.clone();
        apply_env_overlay(&mut merged, env);
        deep_merge(&mut merged, profile_table.clone());

        let settings: ProfileSettings =
            toml::Value::Table(merged)
                .try_into()
                .map_err(|e: toml::de::Error| ProfileError::Invalid {
                    path: PathBuf::from(format!("[profiles.{resolved}]")),
                    reason: e.to_string(),
                })?;

        Ok(ConfigProfile {
            name: requested,
            resolved,
            settings,
        })
    }
}

/// Recursively merge `overlay` into `base`. Tables merge; everything else is replaced.
pub fn deep_merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[derive(Clone, Copy)]
enum EnvKind {
    Text,
    Flag,
    Port,
    /// JSON object or TOML inline table.
    Table,
}

const ENV_OVERLAY: &[(&str, &[&str], EnvKind)] = &[
    ("SECRET_KEY", &["secret_key"], EnvKind::Text),
    ("MIO_TIMEZONE", &["timezone"], EnvKind::Text),
    ("MIO_MAIL_ENABLE", &["mail", "enabled"], EnvKind::Flag),
    ("MIO_MAIL_SERVER", &["mail", "server"], EnvKind::Text),
    ("MIO_MAIL_PORT", &["mail", "port"], EnvKind::Port),
    ("MIO_MAIL_USE_TLS", &["mail", "use_tls"], EnvKind::Flag),
    ("MIO_MAIL_USERNAME", &["mail", "username"], EnvKind::Text),
    ("MIO_MAIL_PASSWORD", &["mail", "password"], EnvKind::Text),
    ("MIO_MAIL_DEFAULT_SENDER", &["mail", "sender"], EnvKind::Text),
    ("MIO_MAIL_SUBJECT_PREFIX", &["mail", "subject_prefix"], EnvKind::Text),
    ("MIO_MONGODB_ENABLE", &["document_store", "enabled"], EnvKind::Flag),
    ("MIO_RDBMS_ENABLE", &["relational", "enabled"], EnvKind::Flag),
    ("MIO_CELERY_ENABLE", &["task_queue", "enabled"], EnvKind::Flag),
    ("MIO_REDIS_ENABLE", &["keyed_store", "enabled"], EnvKind::Flag),
    ("MIO_CACHED_ENABLE", &["cache", "enabled"], EnvKind::Flag),
    ("MIO_CORS_ENABLE", &["cors", "enabled"], EnvKind::Flag),
    ("MIO_CORS_URI", &["cors", "resources"], EnvKind::Table),
];

fn apply_env_overlay(table: &mut toml::Table, env: &Environment) {
    for (var, path, kind) in ENV_OVERLAY {
        let Some(raw) = env.get(var) else { continue };
        let value = match kind {
            EnvKind::Text => toml::Value::String(raw.to_string()),
            EnvKind::Flag => toml::Value::Boolean(parse_flag(raw)),
            EnvKind::Port => match raw.trim().parse::<u16>() {
                Ok(port) => toml::Value::Integer(i64::from(port)),
                Err(_) => {
                    tracing::warn!(var = %var, value = %raw, "Ignoring non-numeric port");
                    continue;
                }
            },
            EnvKind::Table => match parse_table(raw) {
                Some(table) => toml::Value::Table(table),
                None => {
                    tracing::warn!(var = %var, value = %raw, "Ignoring value that is not a table");
                    continue;
                }
            },
        };
        set_path(table, path, value);
    }
}

fn parse_table(raw: &str) -> Option<toml::Table> {
    if let Ok(table) = serde_json::from_str::<toml::Table>(raw) {
        return Some(table);
    }
    let mut wrapped: toml::Table = toml::from_str(&format!("value = {}", raw.trim())).ok()?;
    match wrapped.remove("value") {
        Some(toml::Value::Table(table)) => Some(table),
        _ => None,
    }
}

fn set_path(table: &mut toml::Table, path: &[&str], value: toml::Value) {
    match path {
        [] => {}
        [leaf] => {
            table.insert((*leaf).to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = table
                .entry((*head).to_string())
                .or_insert(toml::Value::Table(toml::Table::new()));
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::Table::new());
            }
            if let toml::Value::Table(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}
