/*!
# Corpus formats

Every supported wire format is read into a lazy sequence of [Record]s through one [FormatReader]
per [FormatKind].

[read_segments] is the single entry point: it combines files (one file per side for
line-oriented formats, chaining for multi-column formats), then selects the requested columns
and metadata the same way for every format.
!*/
mod plain;
mod sgm;
mod tmx;
mod tsv;
mod wmt;
mod xces;

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use itertools::{EitherOrBoth, Itertools};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::cache::VirtualFile;
use crate::error::Error;
use crate::lang::LanguageTag;

pub use xces::{AlignStats, AlignmentResolver};

/// Suffixes that wrap another extension.
pub const COMPRESS_EXTS: &[&str] = &["gz", "bz2", "xz"];

/// Number of leading bytes looked at when sniffing content.
const SNIFF_LEN: usize = 1024;

/// Extension of a file name: the last suffix, or the last two when the last one is a
/// compression suffix (`news.tsv.gz` -> `tsv.gz`).
pub fn detect_extension(name: &str) -> String {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 2 {
        return String::new();
    }
    let last = parts[parts.len() - 1].to_lowercase();
    if COMPRESS_EXTS.contains(&last.as_str()) && parts.len() > 2 {
        format!("{}.{}", parts[parts.len() - 2].to_lowercase(), last)
    } else {
        last
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// One segment per line, one file per side.
    Plain,
    /// Tab separated columns.
    Tsv,
    /// Translation memory exchange.
    Tmx,
    /// Legacy WMT segment-tagged text, one file per side.
    Sgm,
    /// WMT21+ per-file XML test sets.
    WmtXml,
    /// Alignment links over two per-document archives.
    OpusXces,
}

impl FormatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatKind::Plain => "plain",
            FormatKind::Tsv => "tsv",
            FormatKind::Tmx => "tmx",
            FormatKind::Sgm => "sgm",
            FormatKind::WmtXml => "wmt_xml",
            FormatKind::OpusXces => "opus_xces",
        }
    }

    /// Kind for an extension, as returned by [detect_extension].
    ///
    /// `xml` is ambiguous and returns [None]; see [FormatKind::detect].
    pub fn from_ext(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        let base = COMPRESS_EXTS
            .iter()
            .find_map(|c| ext.strip_suffix(&format!(".{c}")))
            .unwrap_or(&ext);
        match base {
            "txt" | "text" | "raw" | "plain" => Some(FormatKind::Plain),
            "tsv" => Some(FormatKind::Tsv),
            "tmx" => Some(FormatKind::Tmx),
            "sgm" | "sgml" => Some(FormatKind::Sgm),
            "opus_xces" => Some(FormatKind::OpusXces),
            "wmt_xml" => Some(FormatKind::WmtXml),
            _ => None,
        }
    }

    /// Detects a kind from a file name and the first bytes of its (decompressed) content.
    pub fn detect(name: &str, head: &[u8]) -> Option<Self> {
        let ext = detect_extension(name);
        if let Some(kind) = Self::from_ext(&ext) {
            return Some(kind);
        }
        let head = String::from_utf8_lossy(head);
        if head.contains("<tmx") {
            Some(FormatKind::Tmx)
        } else if head.contains("<cesAlign") || head.contains("<linkGrp") {
            Some(FormatKind::OpusXces)
        } else if head.contains("<dataset") {
            Some(FormatKind::WmtXml)
        } else if head.contains("<srcset") || head.contains("<refset") {
            Some(FormatKind::Sgm)
        } else {
            None
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Picks the format of `files`: the declared one, or one detected from the first file.
///
/// Two files of unknown type (e.g. `corpus.de`, `corpus.en`) are read as plain text.
pub fn resolve_kind(files: &[VirtualFile], declared: Option<FormatKind>) -> Result<FormatKind, Error> {
    if let Some(kind) = declared {
        return Ok(kind);
    }
    let first = files
        .first()
        .ok_or_else(|| Error::Format("no file to read".to_string()))?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    first
        .open_for_read()?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    match FormatKind::detect(&first.name(), &head) {
        Some(kind) => Ok(kind),
        None if files.len() == 2 => {
            warn!(
                "treating {} and {} as plain text",
                files[0].name(),
                files[1].name()
            );
            Ok(FormatKind::Plain)
        }
        None => Err(Error::Format(format!(
            "could not detect the format of {}",
            first.name()
        ))),
    }
}

/// One parsed unit: text columns, plus optional structured metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    pub segments: Vec<String>,
    pub meta: Option<BTreeMap<String, String>>,
}

impl Record {
    pub fn new(segments: Vec<String>) -> Self {
        Self {
            segments,
            meta: None,
        }
    }

    pub fn with_meta(mut self, key: &str, value: &str) -> Self {
        self.meta
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }
}

/// Lazy, single-pass sequence of records.
pub type Segments = Box<dyn Iterator<Item = Result<Record, Error>> + Send>;

#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// Languages of the sources, in catalog order. Used to pick TMX variants.
    pub langs: Option<(LanguageTag, LanguageTag)>,
    /// 0-based columns to select. Defaults to `(0, 1)`.
    pub cols: Option<(usize, usize)>,
    /// Only one side is read (monolingual datasets).
    pub mono: bool,
    /// Keep metadata and unselected columns.
    pub extra_meta: bool,
    /// Minimum alignment certainty. [None] keeps every link.
    pub min_confidence: Option<f32>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            langs: None,
            cols: None,
            mono: false,
            extra_meta: false,
            min_confidence: Some(0.01),
        }
    }
}

/// A reader for one [FormatKind].
pub trait FormatReader: Sync {
    /// Number of text columns in one record of a single file.
    fn columns(&self) -> usize;

    /// Reads a single file.
    fn read_file(&self, file: &VirtualFile, opts: &ReadOptions) -> Result<Segments, Error>;

    /// Reads a set of files.
    ///
    /// Single-column formats take one file per side, combined positionally. Unequal lengths
    /// are an error. Multi-column formats chain their files.
    fn read(&self, files: &[VirtualFile], opts: &ReadOptions) -> Result<Segments, Error> {
        if files.is_empty() {
            return Err(Error::Format("no file to read".to_string()));
        }
        if self.columns() > 1 {
            let readers = files
                .iter()
                .map(|f| self.read_file(f, opts))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Box::new(readers.into_iter().flatten()));
        }
        match files {
            [single] => self.read_file(single, opts),
            [left, right] => {
                let names = format!("{} and {}", left.name(), right.name());
                Ok(combine_sides(
                    self.read_file(left, opts)?,
                    self.read_file(right, opts)?,
                    names,
                ))
            }
            _ => Err(Error::Format(format!(
                "expected one file per side, got {} files",
                files.len()
            ))),
        }
    }
}

fn combine_sides(left: Segments, right: Segments, names: String) -> Segments {
    Box::new(left.zip_longest(right).map(move |pair| match pair {
        EitherOrBoth::Both(l, r) => {
            let (l, r) = (l?, r?);
            let mut segments = l.segments;
            segments.extend(r.segments);
            let meta = match (l.meta, r.meta) {
                (Some(mut lm), Some(rm)) => {
                    lm.extend(rm);
                    Some(lm)
                }
                (lm, rm) => lm.or(rm),
            };
            Ok(Record { segments, meta })
        }
        _ => Err(Error::Format(format!(
            "{names} have unequal number of segments"
        ))),
    }))
}

pub fn reader_for(kind: FormatKind) -> &'static dyn FormatReader {
    match kind {
        FormatKind::Plain => &plain::PlainReader,
        FormatKind::Tsv => &tsv::TsvReader,
        FormatKind::Tmx => &tmx::TmxReader,
        FormatKind::Sgm => &sgm::SgmReader,
        FormatKind::WmtXml => &wmt::WmtReader,
        FormatKind::OpusXces => &xces::XcesReader,
    }
}

/// Keeps the requested columns of a record, moving the others to metadata.
fn select_columns(mut record: Record, opts: &ReadOptions, index: usize) -> Result<Record, Error> {
    let cols: Vec<usize> = match (opts.mono, opts.cols) {
        (true, Some((c, _))) => vec![c],
        (true, None) => vec![0],
        (false, Some((a, b))) => vec![a, b],
        (false, None) => vec![0, 1],
    };
    let nb_cols = record.segments.len();
    if let Some(c) = cols.iter().find(|&&c| c >= nb_cols) {
        return Err(Error::Format(format!(
            "record {index} has {nb_cols} columns but column {c} is requested"
        )));
    }
    if cols.len() == nb_cols && cols.iter().enumerate().all(|(i, &c)| i == c) {
        if !opts.extra_meta {
            record.meta = None;
        }
        return Ok(record);
    }
    let segments = cols
        .iter()
        .map(|&c| std::mem::take(&mut record.segments[c]))
        .collect();
    let meta = if opts.extra_meta {
        let mut meta = record.meta.unwrap_or_default();
        for (i, rest) in record.segments.into_iter().enumerate() {
            if !cols.contains(&i) {
                meta.insert(format!("col{i}"), rest);
            }
        }
        Some(meta).filter(|m| !m.is_empty())
    } else {
        None
    };
    Ok(Record { segments, meta })
}

/// Reads `files` as `kind`, yielding records with exactly the requested columns.
pub fn read_segments(
    files: &[VirtualFile],
    kind: FormatKind,
    opts: &ReadOptions,
) -> Result<Segments, Error> {
    debug!("reading {} file(s) as {}", files.len(), kind);
    let records = reader_for(kind).read(files, opts)?;
    let opts = opts.clone();
    Ok(Box::new(records.enumerate().map(move |(i, rec)| {
        rec.and_then(|rec| select_columns(rec, &opts, i + 1))
    })))
}

lazy_static! {
    static ref ENTITY: Regex =
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|amp|lt|gt|quot|apos|nbsp);").unwrap();
}

/// Replaces HTML character references. Unknown ones are left as they are.
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ if name.starts_with("#x") || name.starts_with("#X") => {
                    u32::from_str_radix(&name[2..], 16).ok().and_then(char::from_u32)
                }
                _ => name[1..].parse::<u32>().ok().and_then(char::from_u32),
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Unescapes and collapses whitespace runs into single spaces.
pub fn clean_text(text: &str) -> String {
    unescape_html(text).split_whitespace().join(" ")
}
