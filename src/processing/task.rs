/*! Per-entry work.

An [EntryTask] carries everything needed to turn one catalog entry into aligned output files,
so that tasks can run on any worker thread without shared state beyond the cache.
!*/
use std::fs::File;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{debug, info, warn};

use crate::cache::Cache;
use crate::catalog::Entry;
use crate::error::Error;
use crate::formats::{read_segments, resolve_kind, ReadOptions};
use crate::io::{lang_path, LangFiles};
use crate::lang::LanguageTag;

#[derive(Debug, Clone)]
pub struct EntryTask {
    pub entry: Entry,
    /// Requested languages, in output order.
    pub langs: Vec<LanguageTag>,
    /// The entry's sides are in the reverse order of `langs`.
    pub swap: bool,
    pub out_dir: PathBuf,
    pub compress: bool,
    pub extra_meta: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub did: String,
    pub good: usize,
    pub skipped: usize,
    /// Outputs were complete from a previous run.
    pub reused: bool,
    pub paths: Vec<PathBuf>,
}

/// Collapses whitespace runs and trims.
pub fn normalize(segment: &str) -> String {
    segment.split_whitespace().join(" ")
}

/// Marker whose presence means the outputs of `did` in `dir` are complete.
pub fn completion_marker(dir: &Path, did: &str) -> PathBuf {
    dir.join(format!(".valid.{did}"))
}

impl EntryTask {
    pub fn stem(&self) -> String {
        self.entry.did.to_string()
    }

    pub fn output_paths(&self) -> Vec<PathBuf> {
        let stem = self.stem();
        self.langs
            .iter()
            .map(|l| lang_path(&self.out_dir, &stem, l, self.compress))
            .collect()
    }
}

/// Fetches, parses and writes one entry.
///
/// Outputs are skipped when a previous run completed them.
pub fn process_entry(cache: &Cache, task: &EntryTask) -> Result<EntryReport, Error> {
    let did = task.stem();
    let marker = completion_marker(&task.out_dir, &did);
    let paths = task.output_paths();
    if marker.exists() && paths.iter().all(|p| p.exists()) {
        info!("[{}] already done, skipping", did);
        return Ok(EntryReport {
            did,
            good: 0,
            skipped: 0,
            reused: true,
            paths,
        });
    }

    let files = cache.resolve(&task.entry)?;
    let kind = resolve_kind(&files, task.entry.in_ext)?;
    debug!("[{}] reading {} file(s) as {}", did, files.len(), kind);
    let opts = ReadOptions {
        langs: task.entry.did.pair(),
        cols: task.entry.cols,
        mono: task.langs.len() == 1,
        extra_meta: task.extra_meta,
        ..Default::default()
    };

    std::fs::create_dir_all(&task.out_dir)?;
    let mut out = LangFiles::create(
        &task.out_dir,
        &did,
        &task.langs,
        task.compress,
        task.extra_meta,
    )?;
    let (mut good, mut skipped) = (0, 0);
    for record in read_segments(&files, kind, &opts)? {
        let record = record?;
        let mut segments: Vec<String> = record.segments.iter().map(|s| normalize(s)).collect();
        if segments.iter().any(|s| s.is_empty()) {
            skipped += 1;
            continue;
        }
        if task.swap {
            segments.reverse();
        }
        out.write(&segments, record.meta.as_ref())?;
        good += 1;
    }
    out.finish()?;

    if good == 0 {
        return Err(Error::Format(format!(
            "{did}: no valid segment found ({skipped} skipped)"
        )));
    }
    if skipped > good {
        warn!("[{}] more skipped ({}) than valid ({}) segments", did, skipped, good);
    }
    File::create(&marker)?;
    info!("[{}] found {} segments, skipped {}", did, good, skipped);
    Ok(EntryReport {
        did,
        good,
        skipped,
        reused: false,
        paths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  a\t b \u{a0}c\n"), "a b c");
        assert_eq!(normalize("   "), "");
    }
}
