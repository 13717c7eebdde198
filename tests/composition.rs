//! End-to-end composition tests.

use std::collections::BTreeSet;

use axum::{routing::get, Router};

use mio::compose::{ComposeStage, Composer};
use mio::config::env::Environment;
use mio::error::ComposeError;
use mio::extensions::ExtensionKind;
use mio::modules::ModuleError;

mod common;
use common::{composer, composer_with_env, registry, Project, MINIMAL_MANIFEST};

const ROUTED_MANIFEST: &str = r#"
[config]

[[blueprint]]
[blueprint.main]
class = "web.main"

[[blueprint]]
[blueprint.api]
class = "web.api"
url_prefix = "/api"
"#;

#[test]
fn test_minimal_project_composes() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    let (handle, _logger) = composer().compose(project.request()).unwrap();

    assert_eq!(handle.selector().as_str(), "config");
    assert_eq!(handle.profile().name, "default");
    assert_eq!(handle.profile().resolved, "development");
    assert!(handle.static_dir().unwrap().ends_with("web/static"));
    assert!(handle.template_dir().unwrap().ends_with("web/template"));
    assert_eq!(
        handle.enabled_extensions(),
        BTreeSet::from([ExtensionKind::Locale])
    );
    assert!(handle.routes().is_empty());
}

#[test]
fn test_invalid_selector_halts_before_any_path_work() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    for bad in ["../etc", "config/..", "config..x", "config.", "settings"] {
        let failure = composer()
            .compose(project.request().selector(bad))
            .unwrap_err();
        assert_eq!(failure.stage, ComposeStage::Uninitialized, "{bad}");
        assert!(matches!(failure.error, ComposeError::SelectorInvalid(_)), "{bad}");
        assert_eq!(failure.exit_code(), 1);
    }
}

#[test]
fn test_selector_from_environment() {
    let project = Project::new();
    project.write("config/prod/config.toml", MINIMAL_MANIFEST);
    let (handle, _logger) = composer_with_env([("MIO_CONFIG", "config.prod")])
        .compose(project.request())
        .unwrap();
    assert_eq!(handle.selector().as_str(), "config.prod");
    assert!(handle.config_dir().ends_with("config/prod"));
}

#[test]
fn test_missing_selector_directory() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    let failure = composer()
        .compose(project.request().selector("config.staging"))
        .unwrap_err();
    assert_eq!(failure.stage, ComposeStage::SelectorValidated);
    assert!(matches!(failure.error, ComposeError::ConfigModuleMissing { .. }));
}

#[test]
fn test_missing_root() {
    let project = Project::new();
    let failure = composer()
        .compose(mio::ComposeRequest::new(project.path("nope")))
        .unwrap_err();
    assert!(matches!(failure.error, ComposeError::RootUnavailable { .. }));
}

#[cfg(unix)]
#[test]
fn test_symlinked_config_cannot_escape_root() {
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("config.toml"), MINIMAL_MANIFEST).unwrap();

    let project = Project::new();
    std::os::unix::fs::symlink(outside.path(), project.path("config/escape")).unwrap();

    let failure = composer()
        .compose(project.request().selector("config.escape"))
        .unwrap_err();
    assert_eq!(failure.stage, ComposeStage::SelectorValidated);
    assert!(matches!(failure.error, ComposeError::PathEscape { .. }));
}

#[test]
fn test_manifest_not_found() {
    let project = Project::new();
    let failure = composer().compose(project.request()).unwrap_err();
    assert_eq!(failure.stage, ComposeStage::PathResolved);
    assert!(matches!(failure.error, ComposeError::ManifestNotFound(_)));
}

#[test]
fn test_tooling_mode_skips_manifest_and_routes() {
    let project = Project::new();
    let (handle, _logger) = composer()
        .compose(project.request().tooling(true))
        .unwrap();

    assert!(handle.is_tooling_mode());
    assert!(handle.static_dir().is_none());
    assert!(handle.base_settings().is_empty());
    assert!(handle.routes().is_empty());
    assert!(handle.is_enabled(ExtensionKind::Locale));
}

#[test]
fn test_missing_static_folder_fails_before_wiring() {
    let project = Project::with_manifest(
        r#"
[config]
static_folder = "{root_path}/assets"
"#,
    );
    let failure = composer_with_env([("MIO_CORS_ENABLE", "true"), ("MIO_CORS_URI", "{}")])
        .compose(project.request())
        .unwrap_err();

    // CORS would be fatal with an empty mapping; the asset check wins.
    assert_eq!(failure.stage, ComposeStage::PathResolved);
    match failure.error {
        ComposeError::AssetPathMissing { path, .. } => assert!(path.ends_with("assets")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_static_folder_outside_root() {
    let project = Project::with_manifest(
        r#"
[config]
static_folder = "{root_path}/../elsewhere"
"#,
    );
    let failure = composer().compose(project.request()).unwrap_err();
    assert!(matches!(failure.error, ComposeError::PathEscape { .. }));
}

#[cfg(unix)]
#[test]
fn test_static_folder_through_missing_dir_cannot_escape_root() {
    let outside = tempfile::tempdir().unwrap();
    let project = Project::with_manifest(
        r#"
[config]
static_folder = "{root_path}/none/../web/out"
"#,
    );
    std::os::unix::fs::symlink(outside.path(), project.path("web/out")).unwrap();

    let failure = composer().compose(project.request()).unwrap_err();
    assert_eq!(failure.stage, ComposeStage::PathResolved);
    assert!(matches!(failure.error, ComposeError::PathEscape { .. }));
}

#[test]
fn test_unroutable_prefixes_are_malformed() {
    for prefix in ["/{*rest}", "/static", "/static/assets", "api"] {
        let project = Project::with_manifest(&format!(
            r#"
[config]

[[blueprint]]
[blueprint.api]
class = "web.api"
url_prefix = "{prefix}"
"#
        ));
        let failure = composer().compose(project.request()).unwrap_err();
        assert_eq!(failure.stage, ComposeStage::PathResolved, "{prefix}");
        assert!(
            matches!(failure.error, ComposeError::ManifestMalformed { .. }),
            "{prefix}: {}",
            failure.error
        );
    }
}

fn compose_with(modules: mio::modules::ModuleRegistry, project: &Project) -> mio::error::ComposeFailure {
    Composer::new(modules)
        .with_environment(Environment::default())
        .compose(project.request())
        .unwrap_err()
}

#[test]
fn test_overlapping_route_groups_fail_composition() {
    let mut modules = registry();
    modules.register("web.api", "api_again", |_ctx| {
        Router::new().route("/ping", get(|| async { "again" }))
    });
    let project = Project::with_manifest(
        r#"
[config]

[[blueprint]]
[blueprint.api]
class = "web.api"

[[blueprint]]
[blueprint.api_again]
class = "web.api"
"#,
    );

    let failure = compose_with(modules, &project);
    assert_eq!(failure.stage, ComposeStage::ExtensionsWired);
    match failure.error {
        ComposeError::ModuleResolutionFailed(ModuleError::RouteConflict { group, .. }) => {
            assert_eq!(group, "api_again")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_route_group_cannot_shadow_static_mount() {
    let mut modules = registry();
    modules.register("web.assets", "assets", |_ctx| {
        Router::new().route("/static", get(|| async { "shadow" }))
    });
    let project = Project::with_manifest(
        r#"
[config]

[[blueprint]]
[blueprint.assets]
class = "web.assets"
"#,
    );

    let failure = compose_with(modules, &project);
    assert_eq!(failure.stage, ComposeStage::ExtensionsWired);
    match failure.error {
        ComposeError::ModuleResolutionFailed(ModuleError::RouteConflict { group, .. }) => {
            assert_eq!(group, "/static")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_duplicate_route_names_are_malformed() {
    let project = Project::with_manifest(
        r#"
[config]

[[blueprint]]
[blueprint.main]
class = "web.main"

[[blueprint]]
[blueprint.main]
class = "web.api"
"#,
    );
    let failure = composer().compose(project.request()).unwrap_err();
    assert!(matches!(failure.error, ComposeError::ManifestMalformed { .. }));
}

#[test]
fn test_unknown_profile() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    let failure = composer()
        .compose(project.request().profile("staging"))
        .unwrap_err();
    assert_eq!(failure.stage, ComposeStage::ManifestLoaded);
    match failure.error {
        ComposeError::ProfileUnknown { name, available } => {
            assert_eq!(name, "staging");
            assert!(available.contains("production"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_invalid_profile_catalog() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    project.profiles("default_profile = \"missing\"\n");
    let failure = composer().compose(project.request()).unwrap_err();
    assert!(matches!(failure.error, ComposeError::ProfileInvalid { .. }));
}

#[test]
fn test_unregistered_route_module() {
    let project = Project::with_manifest(
        r#"
[config]

[[blueprint]]
[blueprint.admin]
class = "web.admin"
"#,
    );
    let failure = composer().compose(project.request()).unwrap_err();
    assert_eq!(failure.stage, ComposeStage::ExtensionsWired);
    assert!(matches!(failure.error, ComposeError::ModuleResolutionFailed(_)));
}

#[test]
fn test_routes_recorded_in_manifest_order() {
    let project = Project::with_manifest(ROUTED_MANIFEST);
    let (handle, _logger) = composer().compose(project.request()).unwrap();

    let routes: Vec<_> = handle
        .routes()
        .iter()
        .map(|r| (r.name.as_str(), r.url_prefix.as_deref()))
        .collect();
    assert_eq!(routes, vec![("main", None), ("api", Some("/api"))]);
}

#[test]
fn test_csrf_without_secret_is_fatal() {
    let project = Project::with_manifest(
        r#"
[config]
[config.csrf]
enable = true
"#,
    );
    let failure = composer().compose(project.request()).unwrap_err();
    assert_eq!(failure.stage, ComposeStage::ProfileBound);
    match failure.error {
        ComposeError::ExtensionConfigMissing { step, .. } => assert_eq!(step, ExtensionKind::Csrf),
        other => panic!("unexpected error: {other}"),
    }

    let (handle, _logger) = composer_with_env([("SECRET_KEY", "s3cret")])
        .compose(project.request())
        .unwrap();
    assert!(handle.is_enabled(ExtensionKind::Csrf));
}

#[test]
fn test_cors_enabled_with_builtin_profiles() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    let (handle, _logger) = composer_with_env([("MIO_CORS_ENABLE", "true")])
        .compose(project.request())
        .unwrap();

    assert!(handle.is_enabled(ExtensionKind::Cors));
    let policy = handle.cors().unwrap();
    assert!(policy.allows("/anything", "https://any.example"));
}

#[test]
fn test_cors_uri_from_environment() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    let (handle, _logger) = composer_with_env([
        ("MIO_CORS_ENABLE", "true"),
        ("MIO_CORS_URI", r#"{"/api/.*": {"origins": "https://app.example"}}"#),
    ])
    .compose(project.request())
    .unwrap();

    let policy = handle.cors().unwrap();
    assert_eq!(policy.resources().len(), 1);
    assert!(policy.allows("/api/ping", "https://app.example"));
    assert!(!policy.allows("/api/ping", "https://evil.example"));
    assert!(!policy.allows("/", "https://app.example"));
}

#[test]
fn test_cors_enabled_with_empty_mapping_is_fatal() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    let failure = composer_with_env([("MIO_CORS_ENABLE", "true"), ("MIO_CORS_URI", "{}")])
        .compose(project.request())
        .unwrap_err();
    match failure.error {
        ComposeError::ExtensionConfigMissing { step, .. } => assert_eq!(step, ExtensionKind::Cors),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_cors_mapping_passed_through() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    project.profiles(
        r#"
default_profile = "development"

[profiles.development.cors]
enabled = true

[profiles.development.cors.resources."/api/.*"]
origins = ["https://a.example", "https://b.example"]
"#,
    );
    let (handle, _logger) = composer().compose(project.request()).unwrap();

    let policy = handle.cors().unwrap();
    let resource = &policy.resources()["/api/.*"];
    assert!(resource.origins.allows("https://b.example"));
    assert!(!resource.origins.allows("https://c.example"));
}

#[test]
fn test_task_queue_minimal_configuration() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    let (handle, _logger) = composer_with_env([("MIO_CELERY_ENABLE", "1")])
        .compose(project.request())
        .unwrap();

    let queue = handle.task_queue().unwrap();
    assert_eq!(queue.app_name, "mio");
    let keys: Vec<_> = queue.config.keys().collect();
    assert_eq!(keys, vec!["backend", "broker"]);
}

#[test]
fn test_degraded_store_keeps_composition_alive() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    let (handle, _logger) = composer_with_env([("MIO_RDBMS_ENABLE", "true"), ("MIO_REDIS_ENABLE", "true")])
        .compose(project.request())
        .unwrap();

    assert!(handle.relational_store().is_none());
    assert!(handle.keyed_store().is_some());
    let degraded: Vec<_> = handle.degraded().iter().map(|d| d.kind).collect();
    assert_eq!(degraded, vec![ExtensionKind::RelationalStore]);
}

#[test]
fn test_composition_is_idempotent() {
    let project = Project::with_manifest(ROUTED_MANIFEST);
    let composer = composer_with_env([
        ("MIO_MAIL_ENABLE", "true"),
        ("MIO_MONGODB_ENABLE", "true"),
        ("MIO_CACHED_ENABLE", "true"),
    ]);

    let (first, _l1) = composer.compose(project.request()).unwrap();
    let (second, _l2) = composer.compose(project.request()).unwrap();

    assert_ne!(first.instance_id(), second.instance_id());
    assert_eq!(first.enabled_extensions(), second.enabled_extensions());
    assert_eq!(first.wiring_order(), second.wiring_order());
    assert_eq!(first.routes(), second.routes());
    assert!(first.is_enabled(ExtensionKind::DocumentStore));
}

#[test]
fn test_production_logs_to_file() {
    let project = Project::with_manifest(MINIMAL_MANIFEST);
    let request = mio::ComposeRequest::new(project.root()).profile("production");
    let (handle, logger) = composer().compose(request).unwrap();

    assert!(handle.profile().is_production());
    let log = std::fs::read_to_string(logger.file().unwrap()).unwrap();
    assert!(log.contains("Composition ready"));
}
