//! `simbridge.conf` configuration file parser.
//!
//! A config file is a list of `key = value` lines:
//!
//! | Key | Meaning | Default |
//! |-----|---------|---------|
//! | `host` | server address | `127.0.0.1` |
//! | `port` | server port | `65432` |
//! | `prefix` | namespace prefix for remote procedures | `FUN.` |
//! | `max_frame` | largest request/reply in bytes | `8192` |
//! | `logging` | `true` / `false`; `false` limits logs to warnings | `true` |
//!
//! Lines starting with `#` are comments.  Values may be double-quoted.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

use crate::net::{DEFAULT_HOST, DEFAULT_PORT, MAX_FRAME};
use crate::script::scanner::DEFAULT_PREFIX;

/// File name looked up in the platform config directory.
pub const CONFIG_FILE: &str = "simbridge.conf";

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Connection and runtime settings shared by both roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub prefix: String,
    pub max_frame: usize,
    pub logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            prefix: DEFAULT_PREFIX.to_string(),
            max_frame: MAX_FRAME,
            logging: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config text.
    ///
    /// Bad lines are skipped and reported; every other line still applies.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError {
                    line: lineno,
                    message: format!("expected 'key = value', got '{line}'"),
                });
                continue;
            };
            if let Err(message) = config.apply(key.trim(), unquote(value.trim())) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Set one key.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "host" => {
                if value.is_empty() {
                    return Err("host must not be empty".into());
                }
                self.host = value.to_string();
            }
            "port" => {
                self.port = value
                    .parse()
                    .map_err(|_| format!("invalid port '{value}'"))?;
            }
            "prefix" => {
                validate_prefix(value)?;
                self.prefix = value.to_string();
            }
            "max_frame" => {
                self.max_frame = match value.parse::<usize>() {
                    Ok(n) if n > 0 => n,
                    _ => return Err(format!("invalid max_frame '{value}'")),
                };
            }
            "logging" => {
                self.logging = parse_bool(value).ok_or_else(|| format!("invalid boolean '{value}'"))?;
            }
            other => return Err(format!("unknown key '{other}'")),
        }
        Ok(())
    }
}

/// Platform default location of the config file, if one can be determined.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "simbridge").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// A prefix is one or more identifiers joined by `.`, ending in `.`.
pub fn validate_prefix(prefix: &str) -> Result<(), String> {
    let is_ident = |part: &str| {
        let mut chars = part.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    match prefix.strip_suffix('.') {
        Some(body) if body.split('.').all(is_ident) => Ok(()),
        _ => Err(format!("invalid prefix '{prefix}': expected an identifier followed by '.'")),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
