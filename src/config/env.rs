//! Environment-derived settings.
//!
//! # Responsibilities
//! - Capture the process environment once, as an immutable snapshot
//! - Provide typed getters with documented defaults
//! - Parse flag values the same way everywhere (`1/true/yes/on`)
//!
//! # Defaults
//! | Variable           | Default                 |
//! |--------------------|-------------------------|
//! | `MIO_CONFIG`       | `config`                |
//! | `MIO_HOST`         | `127.0.0.1`             |
//! | `MIO_PORT`         | `5050`                  |
//! | `MIO_TIMEZONE`     | `Asia/Shanghai`         |
//! | `MIO_LIMIT_CPU`    | `1`                     |
//! | `MAX_BUFFER_SIZE`  | unset                   |
//! | `MAX_BODY_SIZE`    | `MAX_BUFFER_SIZE`       |
//!
//! Non-numeric values fall back to the default. Variables whose name or value
//! is not valid UTF-8 are left out of the snapshot.

use std::collections::BTreeMap;
use std::ffi::OsString;

use crate::config::selector::DEFAULT_SELECTOR;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5050;
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";
pub const DEFAULT_CPU_LIMIT: usize = 1;

/// Immutable snapshot of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self::from_os_pairs(std::env::vars_os())
    }

    fn from_os_pairs(pairs: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        let vars = pairs
            .into_iter()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (Ok(key), Err(_)) => {
                    tracing::debug!(var = %key, "Skipping variable with a non-UTF-8 value");
                    None
                }
                (Err(_), _) => None,
            })
            .collect();
        Self { vars }
    }

    /// Build a snapshot from explicit pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Raw value; empty strings count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn get_flag(&self, key: &str) -> Option<bool> {
        self.get(key).map(parse_flag)
    }

    pub fn get_number<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn selector(&self) -> &str {
        self.get("MIO_CONFIG").unwrap_or(DEFAULT_SELECTOR)
    }

    pub fn host(&self) -> &str {
        self.get("MIO_HOST").unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.get_number("MIO_PORT").unwrap_or(DEFAULT_PORT)
    }

    pub fn timezone(&self) -> &str {
        self.get("MIO_TIMEZONE").unwrap_or(DEFAULT_TIMEZONE)
    }

    /// Worker thread budget. Always 1 on Windows.
    pub fn cpu_limit(&self) -> usize {
        if cfg!(windows) {
            return 1;
        }
        self.get_number::<usize>("MIO_LIMIT_CPU")
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_CPU_LIMIT)
    }

    pub fn max_buffer_size(&self) -> Option<usize> {
        self.get_number("MAX_BUFFER_SIZE")
    }

    /// Request body cap. Falls back to the buffer size, which bounds how much
    /// of a request is held in memory.
    pub fn max_body_size(&self) -> Option<usize> {
        self.get_number("MAX_BODY_SIZE")
            .or_else(|| self.max_buffer_size())
    }
}

/// Interpret a flag string. Anything other than a known truthy word is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enable" | "enabled"
    )
}

/// Interpret a TOML value as a flag.
pub fn value_is_enabled(value: &toml::Value) -> bool {
    match value {
        toml::Value::Boolean(b) => *b,
        toml::Value::Integer(i) => *i != 0,
        toml::Value::String(s) => parse_flag(s),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let env = Environment::default();
        assert_eq!(env.selector(), "config");
        assert_eq!(env.host(), DEFAULT_HOST);
        assert_eq!(env.port(), DEFAULT_PORT);
        assert_eq!(env.timezone(), DEFAULT_TIMEZONE);
        assert_eq!(env.cpu_limit(), 1);
        assert_eq!(env.max_body_size(), None);
        assert_eq!(env.max_buffer_size(), None);
    }

    #[test]
    fn test_non_numeric_falls_back() {
        let env = Environment::from_pairs([
            ("MIO_PORT", "http"),
            ("MIO_LIMIT_CPU", "many"),
            ("MAX_BODY_SIZE", "1mb"),
            ("MAX_BUFFER_SIZE", "4096"),
        ]);
        assert_eq!(env.port(), DEFAULT_PORT);
        assert_eq!(env.cpu_limit(), 1);
        assert_eq!(env.max_buffer_size(), Some(4096));
        assert_eq!(env.max_body_size(), Some(4096));
    }

    #[test]
    fn test_body_size_overrides_buffer_size() {
        let env = Environment::from_pairs([("MAX_BODY_SIZE", "512"), ("MAX_BUFFER_SIZE", "4096")]);
        assert_eq!(env.max_body_size(), Some(512));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let env = Environment::from_os_pairs([
            (OsString::from("MIO_PORT"), OsString::from("8080")),
            (OsString::from("MIO_HOST"), OsString::from_vec(vec![0x66, 0xff])),
            (OsString::from_vec(vec![0xfe]), OsString::from("x")),
        ]);
        assert_eq!(env.port(), 8080);
        assert_eq!(env.host(), DEFAULT_HOST);
    }

    #[test]
    fn test_process_snapshot() {
        let env = Environment::from_process();
        assert!(env.vars.keys().all(|k| std::env::var_os(k).is_some()));
    }

    #[test]
    fn test_empty_counts_as_unset() {
        let env = Environment::from_pairs([("MIO_CONFIG", ""), ("MIO_HOST", "0.0.0.0")]);
        assert_eq!(env.selector(), "config");
        assert_eq!(env.host(), "0.0.0.0");
    }

    #[test]
    fn test_flags() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("on"));
        assert!(!parse_flag("False"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("maybe"));

        assert!(value_is_enabled(&toml::Value::Boolean(true)));
        assert!(value_is_enabled(&toml::Value::Integer(1)));
        assert!(value_is_enabled(&toml::Value::String("yes".into())));
        assert!(!value_is_enabled(&toml::Value::Float(1.0)));
    }
}
