//! Catalog entries: where a corpus lives and how to read it.
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::formats::{detect_extension, FormatKind};

use super::DatasetId;

/// Container extensions that are archives (need in-archive paths).
pub const ARCHIVE_EXTS: &[&str] = &["zip", "tar", "tar.gz", "tgz"];

/// One corpus resource tied to a dataset id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub did: DatasetId,
    /// One URL, or several fetched together (e.g. one file per side, or the
    /// alignment file plus two document archives for [FormatKind::OpusXces]).
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    /// Glob patterns of the members to read when the resource is an archive.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub in_paths: Vec<String>,
    /// Format of the members inside the archive (or of the files, when known).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_ext: Option<FormatKind>,
    /// 0-based columns to select from delimited sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<(usize, usize)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cite: Vec<String>,
}

fn url_basename(url: &str) -> &str {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}

impl Entry {
    pub fn new(did: DatasetId, url: &str) -> Self {
        Self {
            did,
            urls: vec![url.to_string()],
            filename: None,
            ext: None,
            in_paths: Vec::new(),
            in_ext: None,
            cols: None,
            cite: Vec::new(),
        }
    }

    pub fn with_urls<S: AsRef<str>>(mut self, urls: &[S]) -> Self {
        self.urls = urls.iter().map(|u| u.as_ref().to_string()).collect();
        self
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    pub fn with_ext(mut self, ext: &str) -> Self {
        self.ext = Some(ext.to_string());
        self
    }

    pub fn with_in_paths<S: AsRef<str>>(mut self, in_paths: &[S]) -> Self {
        self.in_paths = in_paths.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    pub fn with_in_ext(mut self, in_ext: FormatKind) -> Self {
        self.in_ext = Some(in_ext);
        self
    }

    pub fn with_cols(mut self, cols: (usize, usize)) -> Self {
        self.cols = Some(cols);
        self
    }

    pub fn with_cite<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        self.cite = keys.iter().map(|k| k.as_ref().to_string()).collect();
        self
    }

    /// Declared extension, or the one detected from the file name or URL.
    pub fn ext(&self) -> String {
        if let Some(ext) = &self.ext {
            return ext.clone();
        }
        let name = match (&self.filename, self.urls.first()) {
            (Some(f), _) => f.as_str(),
            (None, Some(url)) => url_basename(url),
            (None, None) => "",
        };
        detect_extension(name)
    }

    pub fn is_archive(&self) -> bool {
        ARCHIVE_EXTS.contains(&self.ext().as_str())
    }

    /// Alignment-style entry: an alignment file plus two per-document archives.
    pub fn is_alignment(&self) -> bool {
        self.in_ext == Some(FormatKind::OpusXces)
    }

    /// Local file name(s) used in the cache, one per URL.
    pub fn local_filenames(&self) -> Vec<String> {
        if self.urls.len() == 1 {
            let name = self
                .filename
                .clone()
                .unwrap_or_else(|| format!("{}-{}.{}", self.did.name(), self.did.lang_str(), self.ext()));
            return vec![name];
        }
        self.urls
            .iter()
            .enumerate()
            .map(|(i, url)| match url_basename(url) {
                "" => format!("{}-{}", self.did.name(), i),
                base => base.to_string(),
            })
            .collect()
    }

    /// Checks the invariants of a catalog entry.
    pub fn validate(&self) -> Result<(), Error> {
        let fail = |msg: &str| Err(Error::CatalogLookup(format!("{}: {}", self.did, msg)));
        if self.urls.is_empty() {
            return fail("no URL given");
        }
        if self.is_alignment() {
            if self.urls.len() != 3 {
                return fail("alignment entries need 3 URLs (alignments, lang1 docs, lang2 docs)");
            }
            if !self.did.is_bitext() {
                return fail("alignment entries must be bitexts");
            }
        } else if self.is_archive() {
            if self.in_paths.is_empty() {
                return fail("archive entries must have in-archive paths");
            }
            if self.in_ext.is_none() {
                return fail("archive entries must have an in-archive format");
            }
        }
        if let Some((a, b)) = self.cols {
            if a == b {
                return fail("selected columns must differ");
            }
        }
        Ok(())
    }

    /// Tab-separated one-line summary used when listing entries.
    pub fn format(&self, delim: &str) -> String {
        [
            self.did.to_string(),
            self.urls.join(" "),
            self.in_paths.join(","),
        ]
        .join(delim)
    }
}
