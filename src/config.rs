//! Runtime configuration from the environment.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;

use crate::cache::DEFAULT_LOCK_TIMEOUT;

/// Cache root. Defaults to `~/.mtdata`.
pub const ENV_ROOT: &str = "MTDATA";
/// Lock timeout, in seconds.
pub const ENV_LOCK_TIMEOUT: &str = "MTDATA_LOCK_TIMEOUT";
/// Default number of parallel workers.
pub const ENV_JOBS: &str = "MTDATA_JOBS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub cache_root: PathBuf,
    pub lock_timeout: Duration,
    pub n_jobs: usize,
}

fn expand_home(path: &str) -> PathBuf {
    let home = env::var("HOME").unwrap_or_default();
    if let Some(rest) = path.strip_prefix("~/") {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path.replace("$HOME", &home))
}

fn parse_var<T: std::str::FromStr>(name: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {}={}", name, v);
            default
        }),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: expand_home("~/.mtdata"),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            n_jobs: 1,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Builds a config from a variable lookup function.
    pub fn from_vars<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let default = Self::default();
        let cache_root = lookup(ENV_ROOT)
            .filter(|v| !v.is_empty())
            .map(|v| expand_home(&v))
            .unwrap_or(default.cache_root);
        let timeout = parse_var(
            ENV_LOCK_TIMEOUT,
            lookup(ENV_LOCK_TIMEOUT),
            default.lock_timeout.as_secs(),
        );
        let n_jobs = parse_var(ENV_JOBS, lookup(ENV_JOBS), default.n_jobs).max(1);
        Self {
            cache_root,
            lock_timeout: Duration::from_secs(timeout),
            n_jobs,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_from_vars() {
        let vars: HashMap<&str, &str> = [
            (ENV_ROOT, "/data/mtdata"),
            (ENV_LOCK_TIMEOUT, "60"),
            (ENV_JOBS, "not a number"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_vars(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.cache_root, PathBuf::from("/data/mtdata"));
        assert_eq!(config.lock_timeout, Duration::from_secs(60));
        assert_eq!(config.n_jobs, 1);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(|_| None);
        assert!(config.cache_root.ends_with(".mtdata"));
        assert_eq!(config.lock_timeout, DEFAULT_LOCK_TIMEOUT);
    }
}
