//! Configuration-module selector validation.
//!
//! A selector such as `config.prod` names the directory `config/prod` under
//! the project root. That directory holds the manifest (`config.toml`) and
//! the optional profile catalog (`profiles.toml`).

use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::config::path_guard::{PathGuard, PathGuardError, ResolvedPath};

/// Fixed first segment of every selector.
pub const SELECTOR_ROOT: &str = "config";

/// Selector used when none is supplied.
pub const DEFAULT_SELECTOR: &str = SELECTOR_ROOT;

static SELECTOR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^config(\.[a-zA-Z0-9_]+)*$").expect("selector pattern is a valid regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid config selector {value:?}: {reason} (e.g. config.prod)")]
pub struct SelectorError {
    pub value: String,
    pub reason: &'static str,
}

/// A validated configuration-module selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector(String);

impl Selector {
    /// Validate a raw selector. Surrounding whitespace is ignored.
    pub fn validate(raw: &str) -> Result<Self, SelectorError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(SelectorError {
                value: raw.to_string(),
                reason: "selector is empty",
            });
        }
        if !SELECTOR_PATTERN.is_match(value) {
            return Err(SelectorError {
                value: raw.to_string(),
                reason: "expected dot-separated [a-zA-Z0-9_] segments starting with `config`",
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Segments in order, starting with `config`.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Relative directory named by this selector.
    pub fn relative_path(&self) -> PathBuf {
        self.segments().collect()
    }

    /// Resolve the selector's directory under the guard's root.
    pub fn locate(&self, guard: &PathGuard) -> Result<ResolvedPath, PathGuardError> {
        guard.resolve(self.relative_path())
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self(DEFAULT_SELECTOR.to_string())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_grammar() {
        for raw in ["config", "config.prod", "config.eu_west.v2", " config.dev "] {
            assert!(Selector::validate(raw).is_ok(), "{raw} should be valid");
        }
        let sel = Selector::validate("config.eu_west.v2").unwrap();
        assert_eq!(sel.relative_path(), PathBuf::from("config/eu_west/v2"));
    }

    #[test]
    fn test_rejects_everything_else() {
        for raw in [
            "",
            "   ",
            "prod",
            "configs.prod",
            "config.",
            "config..prod",
            "config/prod",
            "config.../etc",
            "config.prod-eu",
            "config.prod\\x",
            ".config",
            "config.pr od",
        ] {
            let err = Selector::validate(raw).unwrap_err();
            assert_eq!(err.value, raw);
        }
    }

    #[test]
    fn test_locate_stays_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        let sel = Selector::validate("config.prod").unwrap();
        let located = sel.locate(&guard).unwrap();
        assert_eq!(located.as_path(), guard.root().join("config").join("prod"));
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_rejects_symlinked_escape() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("app")).unwrap();
        std::fs::create_dir(dir.path().join("elsewhere")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("elsewhere"), dir.path().join("app/config"))
            .unwrap();
        let guard = PathGuard::new(dir.path().join("app")).unwrap();

        let sel = Selector::validate("config.prod").unwrap();
        assert!(matches!(
            sel.locate(&guard),
            Err(PathGuardError::Escape { .. })
        ));
    }
}
