/*! Merging train parts.

Parts are concatenated in the order they were requested into `train.<lang>[.gz]`, with the
source id of every line in `train.meta.gz`.

Optionally drops:

- exact duplicate segment tuples within train,
- train tuples overlapping dev/test data: same unordered pair, or any single segment seen in
  dev/test.

Counts are kept per part and written to `train.stats.json`.
!*/
use std::collections::{BTreeMap, HashSet};
use std::hash::{BuildHasherDefault, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;
use twox_hash::XxHash64;

use crate::error::Error;
use crate::io::{create_text, open_text, LangFiles, LossyLines};
use crate::lang::LanguageTag;

type HashSet64 = HashSet<u64, BuildHasherDefault<XxHash64>>;

pub fn hash_segment(segment: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(segment.as_bytes());
    hasher.finish()
}

fn combine(hashes: &[u64]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    for h in hashes {
        hasher.write_u64(*h);
    }
    hasher.finish()
}

/// Order sensitive hash of a segment tuple.
pub fn hash_tuple(segments: &[String]) -> u64 {
    let hashes: Vec<u64> = segments.iter().map(|s| hash_segment(s)).collect();
    combine(&hashes)
}

/// Order insensitive hash of a segment tuple.
pub fn hash_unordered(segments: &[String]) -> u64 {
    let mut hashes: Vec<u64> = segments.iter().map(|s| hash_segment(s)).collect();
    hashes.sort_unstable();
    combine(&hashes)
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PartStats {
    pub seen: usize,
    pub dupes: usize,
    pub test_overlap: usize,
    pub selected: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub total: usize,
    pub dupes: usize,
    pub test_overlap: usize,
    pub parts: BTreeMap<String, PartStats>,
}

/// Hashes of dev/test data.
#[derive(Debug, Default)]
pub struct TestHashes {
    segments: HashSet64,
    pairs: HashSet64,
}

impl TestHashes {
    pub fn add(&mut self, segments: &[String]) {
        for s in segments {
            self.segments.insert(hash_segment(s));
        }
        self.pairs.insert(hash_unordered(segments));
    }

    pub fn overlaps(&self, segments: &[String]) -> bool {
        self.pairs.contains(&hash_unordered(segments))
            || segments
                .iter()
                .any(|s| self.segments.contains(&hash_segment(s)))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Reads aligned files line by line, one file per language.
pub struct AlignedLines {
    name: String,
    readers: Vec<LossyLines>,
}

impl AlignedLines {
    pub fn open(paths: &[PathBuf]) -> Result<Self, Error> {
        let readers = paths
            .iter()
            .map(|p| open_text(p).map(LossyLines::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: format!("{:?}", paths),
            readers,
        })
    }
}

impl Iterator for AlignedLines {
    type Item = Result<Vec<String>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines: Vec<Option<Result<String, Error>>> =
            self.readers.iter_mut().map(|r| r.next()).collect();
        if lines.iter().all(Option::is_none) {
            return None;
        }
        if lines.iter().any(Option::is_none) {
            return Some(Err(Error::Format(format!(
                "{} have unequal number of lines",
                self.name
            ))));
        }
        Some(lines.into_iter().flatten().collect())
    }
}

/// Collects the hashes of dev/test outputs.
pub fn load_test_hashes(tests: &[Vec<PathBuf>]) -> Result<TestHashes, Error> {
    let mut hashes = TestHashes::default();
    for paths in tests {
        for segments in AlignedLines::open(paths)? {
            hashes.add(&segments?);
        }
    }
    debug!("{} dev/test tuples hashed", hashes.len());
    Ok(hashes)
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub compress: bool,
    pub drop_dupes: bool,
    pub drop_tests: bool,
}

/// Merges `parts` (id, per-language files) into `out_dir`.
pub fn merge_parts(
    parts: &[(String, Vec<PathBuf>)],
    tests: &TestHashes,
    langs: &[LanguageTag],
    out_dir: &Path,
    opts: &MergeOptions,
) -> Result<MergeStats, Error> {
    info!("merging {} parts into {:?}", parts.len(), out_dir);
    let mut out = LangFiles::create(out_dir, "train", langs, opts.compress, false)?;
    let mut meta = create_text(&out_dir.join("train.meta.gz"))?;
    let mut seen = HashSet64::default();
    let mut stats = MergeStats::default();

    for (did, paths) in parts {
        let mut part = PartStats::default();
        for segments in AlignedLines::open(paths)? {
            let segments = segments?;
            part.seen += 1;
            if opts.drop_tests && tests.overlaps(&segments) {
                part.test_overlap += 1;
                continue;
            }
            if opts.drop_dupes && !seen.insert(hash_tuple(&segments)) {
                part.dupes += 1;
                continue;
            }
            out.write(&segments, None)?;
            writeln!(meta, "{did}")?;
            part.selected += 1;
        }
        info!(
            "[{}] seen {}, dupes {}, test overlap {}, selected {}",
            did, part.seen, part.dupes, part.test_overlap, part.selected
        );
        stats.total += part.selected;
        stats.dupes += part.dupes;
        stats.test_overlap += part.test_overlap;
        stats.parts.insert(did.clone(), part);
    }
    out.finish()?;
    meta.finish()?;

    let stats_file = std::fs::File::create(out_dir.join("train.stats.json"))?;
    serde_json::to_writer_pretty(stats_file, &stats)?;
    info!("train total: {} ({} dupes, {} test overlaps dropped)", stats.total, stats.dupes, stats.test_overlap);
    Ok(stats)
}
