//! Ordered extension wiring steps.
//!
//! # Order
//! ```text
//! 1. locale           always
//! 2. csrf             manifest `config.csrf.enable`   fatal
//! 3. mail             `mail.enabled`                  never fails
//! 4. document_store   `document_store.enabled`        degrades
//! 5. relational       `relational.enabled`            degrades
//! 6. task_queue       `task_queue.enabled`            degrades
//! 7. keyed_store      `keyed_store.enabled`           degrades
//! 8. cors             `cors.enabled`                  fatal
//! 9. response_cache   `cache.enabled`                 degrades
//! ```
//!
//! # Design Decisions
//! - Flags are evaluated once, when their step is reached
//! - A disabled step leaves no trace besides a debug log line
//! - A degraded step is logged, recorded, and its slot stays empty
//! - A fatal step stops wiring; nothing already wired is rolled back

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::manifest::BaseSettings;
use crate::config::profile::ConfigProfile;
use crate::extensions::cors::CorsPolicy;
use crate::extensions::subsystems::{
    CacheBackend, CsrfGuard, DocumentStore, KeyedStore, Locale, Mailer, RelationalStore,
    ResponseCache, Subsystems, TaskQueue, TaskQueueConfig,
};

/// Name task queues are registered under.
pub const TASK_QUEUE_APP_NAME: &str = "mio";

/// Identifies one optional subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    Locale,
    Csrf,
    Mail,
    DocumentStore,
    RelationalStore,
    TaskQueue,
    KeyedStore,
    Cors,
    ResponseCache,
}

impl ExtensionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionKind::Locale => "locale",
            ExtensionKind::Csrf => "csrf",
            ExtensionKind::Mail => "mail",
            ExtensionKind::DocumentStore => "document_store",
            ExtensionKind::RelationalStore => "relational_store",
            ExtensionKind::TaskQueue => "task_queue",
            ExtensionKind::KeyedStore => "keyed_store",
            ExtensionKind::Cors => "cors",
            ExtensionKind::ResponseCache => "response_cache",
        }
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a failing step does to composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Composition stops.
    Fatal,
    /// The subsystem is left out and composition continues.
    Degrade,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error("required setting `{setting}` is missing")]
    Missing { setting: &'static str },

    #[error("setting `{setting}` is invalid: {reason}")]
    Invalid { setting: &'static str, reason: String },
}

/// Inputs every step reads from. Read-only for the whole wiring pass.
#[derive(Debug, Clone, Copy)]
pub struct WiringContext<'a> {
    pub profile: &'a ConfigProfile,
    pub base: &'a BaseSettings,
}

type Predicate = fn(&WiringContext<'_>) -> bool;
type WireFn = fn(&WiringContext<'_>, &mut Subsystems) -> Result<(), ExtensionError>;

/// One optional subsystem's gated wiring logic.
#[derive(Clone)]
pub struct ExtensionStep {
    pub kind: ExtensionKind,
    /// Setting the gate reads, for logs.
    pub flag_name: &'static str,
    pub policy: FailurePolicy,
    predicate: Predicate,
    wire: WireFn,
}

impl ExtensionStep {
    pub fn is_enabled(&self, ctx: &WiringContext<'_>) -> bool {
        (self.predicate)(ctx)
    }

    /// Run this step's wiring unconditionally.
    pub fn wire(&self, ctx: &WiringContext<'_>, subsystems: &mut Subsystems) -> Result<(), ExtensionError> {
        (self.wire)(ctx, subsystems)
    }
}

impl fmt::Debug for ExtensionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionStep")
            .field("kind", &self.kind)
            .field("flag_name", &self.flag_name)
            .field("policy", &self.policy)
            .finish()
    }
}

/// An enabled step that failed without stopping composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedExtension {
    pub kind: ExtensionKind,
    pub reason: String,
}

/// Outcome of one wiring pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WiringReport {
    /// Successfully wired, in wiring order.
    pub wired: Vec<ExtensionKind>,
    pub skipped: Vec<ExtensionKind>,
    pub degraded: Vec<DegradedExtension>,
}

/// A fatal step failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} wiring failed: {source}")]
pub struct FatalExtensionError {
    pub kind: ExtensionKind,
    #[source]
    pub source: ExtensionError,
}

/// The fixed, ordered list of wiring steps.
#[derive(Debug, Clone)]
pub struct ExtensionRegistry {
    steps: Vec<ExtensionStep>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ExtensionRegistry {
    pub fn standard() -> Self {
        let step = |kind, flag_name, policy, predicate: Predicate, wire: WireFn| ExtensionStep {
            kind,
            flag_name,
            policy,
            predicate,
            wire,
        };

        Self {
            steps: vec![
                step(ExtensionKind::Locale, "always", FailurePolicy::Fatal, |_| true, wire_locale),
                step(
                    ExtensionKind::Csrf,
                    "config.csrf.enable",
                    FailurePolicy::Fatal,
                    |ctx| ctx.base.csrf_enabled(),
                    wire_csrf,
                ),
                step(
                    ExtensionKind::Mail,
                    "mail.enabled",
                    FailurePolicy::Degrade,
                    |ctx| ctx.profile.settings.mail.enabled,
                    wire_mail,
                ),
                step(
                    ExtensionKind::DocumentStore,
                    "document_store.enabled",
                    FailurePolicy::Degrade,
                    |ctx| ctx.profile.settings.document_store.enabled,
                    wire_document_store,
                ),
                step(
                    ExtensionKind::RelationalStore,
                    "relational.enabled",
                    FailurePolicy::Degrade,
                    |ctx| ctx.profile.settings.relational.enabled,
                    wire_relational,
                ),
                step(
                    ExtensionKind::TaskQueue,
                    "task_queue.enabled",
                    FailurePolicy::Degrade,
                    |ctx| ctx.profile.settings.task_queue.enabled,
                    wire_task_queue,
                ),
                step(
                    ExtensionKind::KeyedStore,
                    "keyed_store.enabled",
                    FailurePolicy::Degrade,
                    |ctx| ctx.profile.settings.keyed_store.enabled,
                    wire_keyed_store,
                ),
                step(
                    ExtensionKind::Cors,
                    "cors.enabled",
                    FailurePolicy::Fatal,
                    |ctx| ctx.profile.settings.cors.enabled,
                    wire_cors,
                ),
                step(
                    ExtensionKind::ResponseCache,
                    "cache.enabled",
                    FailurePolicy::Degrade,
                    |ctx| ctx.profile.settings.cache.enabled,
                    wire_response_cache,
                ),
            ],
        }
    }

    pub fn steps(&self) -> &[ExtensionStep] {
        &self.steps
    }

    pub fn step(&self, kind: ExtensionKind) -> Option<&ExtensionStep> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    /// Run every step in order.
    pub fn run(
        &self,
        ctx: &WiringContext<'_>,
        subsystems: &mut Subsystems,
    ) -> Result<WiringReport, FatalExtensionError> {
        let mut report = WiringReport::default();

        for step in &self.steps {
            if !step.is_enabled(ctx) {
                tracing::debug!(extension = %step.kind, flag = step.flag_name, "Extension disabled");
                report.skipped.push(step.kind);
                continue;
            }

            match step.wire(ctx, subsystems) {
                Ok(()) => {
                    tracing::info!(extension = %step.kind, "Extension wired");
                    report.wired.push(step.kind);
                }
                Err(source) if step.policy == FailurePolicy::Fatal => {
                    tracing::error!(extension = %step.kind, error = %source, "Extension misconfigured");
                    return Err(FatalExtensionError {
                        kind: step.kind,
                        source,
                    });
                }
                Err(source) => {
                    tracing::warn!(
                        extension = %step.kind,
                        error = %source,
                        "Extension misconfigured, continuing without it"
                    );
                    report.degraded.push(DegradedExtension {
                        kind: step.kind,
                        reason: source.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: &'a Option<String>, setting: &'static str) -> Result<&'a str, ExtensionError> {
    non_empty(value).ok_or(ExtensionError::Missing { setting })
}

fn parse_url(value: &str, setting: &'static str) -> Result<Url, ExtensionError> {
    Url::parse(value).map_err(|e| ExtensionError::Invalid {
        setting,
        reason: e.to_string(),
    })
}

fn wire_locale(ctx: &WiringContext<'_>, subsystems: &mut Subsystems) -> Result<(), ExtensionError> {
    let settings = &ctx.profile.settings;
    let mut languages: Vec<String> = settings
        .languages
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    let default_language = match settings.default_language.trim() {
        "" => languages.first().cloned().unwrap_or_else(|| "en".to_string()),
        lang => lang.to_string(),
    };
    if !languages.contains(&default_language) {
        languages.insert(0, default_language.clone());
    }

    subsystems.locale = Some(Locale {
        languages,
        default_language,
        timezone: settings.timezone.clone(),
    });
    Ok(())
}

fn wire_csrf(ctx: &WiringContext<'_>, subsystems: &mut Subsystems) -> Result<(), ExtensionError> {
    let secret = required(&ctx.profile.settings.secret_key, "secret_key")?;
    subsystems.csrf = Some(CsrfGuard::new(secret.to_string()));
    Ok(())
}

fn wire_mail(ctx: &WiringContext<'_>, subsystems: &mut Subsystems) -> Result<(), ExtensionError> {
    let mail = &ctx.profile.settings.mail;
    let mailer = Mailer {
        server: non_empty(&mail.server)
            .unwrap_or(Mailer::DEFAULT_SERVER)
            .to_string(),
        port: mail.port.unwrap_or(Mailer::DEFAULT_PORT),
        use_tls: mail.use_tls,
        username: non_empty(&mail.username).map(str::to_string),
        password: non_empty(&mail.password).map(str::to_string),
        sender: non_empty(&mail.sender)
            .unwrap_or(Mailer::DEFAULT_SENDER)
            .to_string(),
        subject_prefix: non_empty(&mail.subject_prefix)
            .unwrap_or(Mailer::DEFAULT_SUBJECT_PREFIX)
            .to_string(),
    };
    if !mailer.has_credentials() {
        tracing::debug!(server = %mailer.server, "Mail transport has no credentials");
    }
    subsystems.mail = Some(mailer);
    Ok(())
}

fn wire_document_store(ctx: &WiringContext<'_>, subsystems: &mut Subsystems) -> Result<(), ExtensionError> {
    let settings = &ctx.profile.settings.document_store;
    subsystems.document_store = Some(DocumentStore {
        db: required(&settings.db, "document_store.db")?.to_string(),
        host: required(&settings.host, "document_store.host")?.to_string(),
        port: settings.port.unwrap_or(DocumentStore::DEFAULT_PORT),
        username: non_empty(&settings.username).map(str::to_string),
        connect: settings.connect,
    });
    Ok(())
}

fn wire_relational(ctx: &WiringContext<'_>, subsystems: &mut Subsystems) -> Result<(), ExtensionError> {
    let settings = &ctx.profile.settings.relational;
    let url = required(&settings.url, "relational.url")?;
    subsystems.relational = Some(RelationalStore {
        url: parse_url(url, "relational.url")?,
        echo: settings.echo,
    });
    Ok(())
}

fn wire_task_queue(ctx: &WiringContext<'_>, subsystems: &mut Subsystems) -> Result<(), ExtensionError> {
    let settings = &ctx.profile.settings.task_queue;
    let broker = required(&settings.broker_url, "task_queue.broker_url")?;
    let backend = required(&settings.backend_url, "task_queue.backend_url")?;

    let mut config = TaskQueueConfig::default();
    config.insert("broker", toml::Value::String(broker.to_string()));
    config.insert("backend", toml::Value::String(backend.to_string()));

    let optional: [(&str, Option<toml::Value>); 5] = [
        ("result_backend", settings.result_backend.clone().map(toml::Value::String)),
        ("result_persistent", settings.result_persistent.map(toml::Value::Boolean)),
        ("result_exchange", settings.result_exchange.clone().map(toml::Value::String)),
        (
            "result_exchange_type",
            settings.result_exchange_type.clone().map(toml::Value::String),
        ),
        ("broker_use_ssl", settings.broker_use_ssl.clone()),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            config.insert(key, value);
        }
    }

    tracing::debug!(keys = ?config.keys().collect::<Vec<_>>(), "Task queue configuration assembled");
    subsystems.task_queue = Some(TaskQueue {
        app_name: TASK_QUEUE_APP_NAME.to_string(),
        config,
    });
    Ok(())
}

fn wire_keyed_store(ctx: &WiringContext<'_>, subsystems: &mut Subsystems) -> Result<(), ExtensionError> {
    let settings = &ctx.profile.settings.keyed_store;
    let url = required(&settings.url, "keyed_store.url")?;
    subsystems.keyed_store = Some(KeyedStore {
        url: parse_url(url, "keyed_store.url")?,
        key_prefix: settings.key_prefix.clone(),
    });
    Ok(())
}

fn wire_cors(ctx: &WiringContext<'_>, subsystems: &mut Subsystems) -> Result<(), ExtensionError> {
    let resources = &ctx.profile.settings.cors.resources;
    if resources.is_empty() {
        return Err(ExtensionError::Missing {
            setting: "cors.resources",
        });
    }
    subsystems.cors = Some(CorsPolicy::new(resources.clone())?);
    Ok(())
}

fn wire_response_cache(ctx: &WiringContext<'_>, subsystems: &mut Subsystems) -> Result<(), ExtensionError> {
    let settings = &ctx.profile.settings.cache;
    let backend = match settings.kind.trim().to_ascii_lowercase().as_str() {
        "simple" | "" => CacheBackend::Simple,
        "redis" => {
            let url = required(&settings.redis_url, "cache.redis_url")?;
            CacheBackend::Redis(parse_url(url, "cache.redis_url")?)
        }
        other => {
            return Err(ExtensionError::Invalid {
                setting: "cache.kind",
                reason: format!("unsupported cache kind `{other}`"),
            })
        }
    };
    subsystems.cache = Some(ResponseCache {
        backend,
        default_timeout: Duration::from_secs(settings.default_timeout_secs),
    });
    Ok(())
}

/// Kinds present in `subsystems`, in wiring order.
pub fn enabled_kinds(subsystems: &Subsystems) -> BTreeMap<ExtensionKind, bool> {
    BTreeMap::from([
        (ExtensionKind::Locale, subsystems.locale.is_some()),
        (ExtensionKind::Csrf, subsystems.csrf.is_some()),
        (ExtensionKind::Mail, subsystems.mail.is_some()),
        (ExtensionKind::DocumentStore, subsystems.document_store.is_some()),
        (ExtensionKind::RelationalStore, subsystems.relational.is_some()),
        (ExtensionKind::TaskQueue, subsystems.task_queue.is_some()),
        (ExtensionKind::KeyedStore, subsystems.keyed_store.is_some()),
        (ExtensionKind::Cors, subsystems.cors.is_some()),
        (ExtensionKind::ResponseCache, subsystems.cache.is_some()),
    ])
}
