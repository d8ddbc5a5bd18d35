//! Error enum
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::lang::LangTagError;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Http(reqwest::Error),
    Url(url::ParseError),
    Zip(zip::result::ZipError),
    Xml(roxmltree::Error),
    Csv(csv::Error),
    Serde(serde_json::Error),
    GlobPattern(glob::PatternError),
    ThreadPool(rayon::ThreadPoolBuildError),

    /// Unknown dataset id, or a catalog that cannot be used.
    CatalogLookup(String),
    LanguageTag(LangTagError),
    /// Network (or local copy) failure for a single resource.
    Fetch { url: String, message: String },
    /// Malformed source data. Fatal for the entry it belongs to.
    Format(String),
    LockTimeout { path: PathBuf, timeout: Duration },
    PartialFailure { failed: usize, total: usize },
    Custom(String),
}

impl Error {
    /// Errors that must abort a run before any network activity.
    pub fn is_fatal_upfront(&self) -> bool {
        matches!(self, Error::CatalogLookup(_) | Error::LanguageTag(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Url(e) => write!(f, "invalid URL: {e}"),
            Error::Zip(e) => write!(f, "zip error: {e}"),
            Error::Xml(e) => write!(f, "XML error: {e}"),
            Error::Csv(e) => write!(f, "delimited text error: {e}"),
            Error::Serde(e) => write!(f, "JSON error: {e}"),
            Error::GlobPattern(e) => write!(f, "invalid glob: {e}"),
            Error::ThreadPool(e) => write!(f, "could not build worker pool: {e}"),
            Error::CatalogLookup(msg) => write!(f, "catalog lookup failed: {msg}"),
            Error::LanguageTag(e) => write!(f, "{e}"),
            Error::Fetch { url, message } => write!(f, "could not fetch {url}: {message}"),
            Error::Format(msg) => write!(f, "format error: {msg}"),
            Error::LockTimeout { path, timeout } => write!(
                f,
                "timed out after {}s waiting for lock {:?}; if no other process is using it, remove the stale lock file",
                timeout.as_secs(),
                path
            ),
            Error::PartialFailure { failed, total } => {
                write!(f, "{failed} of {total} entries failed")
            }
            Error::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::Http(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Error {
        Error::Url(e)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Error {
        Error::Zip(e)
    }
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Error {
        Error::Xml(e)
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Error {
        Error::Csv(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Serde(e)
    }
}

impl From<glob::PatternError> for Error {
    fn from(e: glob::PatternError) -> Error {
        Error::GlobPattern(e)
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(e: rayon::ThreadPoolBuildError) -> Error {
        Error::ThreadPool(e)
    }
}

impl From<LangTagError> for Error {
    fn from(e: LangTagError) -> Error {
        Error::LanguageTag(e)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
