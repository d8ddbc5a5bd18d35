/*! Dataset assembly.

Output layout of a run:

```text
<out>/train-parts/<id>.<lang>[.gz]
<out>/tests/<id>.<lang>
<out>/test1.<lang> -> tests/<id>.<lang>
<out>/dev.<lang>
<out>/train.<lang>[.gz], train.meta.gz, train.stats.json
<out>/errors.tsv
<out>/mtdata.signature.txt
```

Every requested id is checked against the catalog and the requested languages before anything
is fetched. Entries are then processed on a fixed-size worker pool; one entry failing does not
stop the others unless `fail_fast` is set.
!*/
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use rayon::prelude::*;

use crate::cache::Cache;
use crate::catalog::{Catalog, DatasetId};
use crate::error::Error;
use crate::io::{lang_path, open_text};
use crate::lang::{check_compat_swap, LanguageTag};

use super::merge::{load_test_hashes, merge_parts, MergeOptions, MergeStats};
use super::task::{process_entry, EntryReport, EntryTask};

pub const TRAIN_PARTS_DIR: &str = "train-parts";
pub const TESTS_DIR: &str = "tests";

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    /// Merge train parts into single train files.
    pub merge: bool,
    /// Gzip train outputs.
    pub compress: bool,
    pub drop_dupes: bool,
    pub drop_tests: bool,
    /// Abort on the first failing entry.
    pub fail_fast: bool,
    pub n_jobs: usize,
    pub extra_meta: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            merge: false,
            compress: false,
            drop_dupes: false,
            drop_tests: false,
            fail_fast: false,
            n_jobs: 1,
            extra_meta: false,
        }
    }
}

/// What to assemble.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub langs: Vec<LanguageTag>,
    pub train: Vec<DatasetId>,
    pub dev: Vec<DatasetId>,
    pub tests: Vec<DatasetId>,
}

#[derive(Debug, Default)]
pub struct AssembleReport {
    pub entries: Vec<EntryReport>,
    /// Failed ids and their error.
    pub failed: Vec<(String, String)>,
    pub merge: Option<MergeStats>,
}

impl AssembleReport {
    /// Turns recorded entry failures into an error.
    pub fn check(&self) -> Result<(), Error> {
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(Error::PartialFailure {
                failed: self.failed.len(),
                total: self.failed.len() + self.entries.len(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Split {
    Train,
    Dev,
    Test,
}

pub struct Assembler<'a> {
    catalog: &'a Catalog,
    cache: &'a Cache,
    out_dir: PathBuf,
    opts: AssembleOptions,
}

impl<'a> Assembler<'a> {
    pub fn new(catalog: &'a Catalog, cache: &'a Cache, out_dir: &Path, opts: AssembleOptions) -> Self {
        Self {
            catalog,
            cache,
            out_dir: out_dir.to_path_buf(),
            opts,
        }
    }

    /// Checks ids and languages, and builds the tasks. No network activity happens here.
    fn plan(&self, request: &Request) -> Result<Vec<(Split, EntryTask)>, Error> {
        let langs = &request.langs;
        if langs.is_empty() || langs.len() > 2 {
            return Err(Error::Custom(format!(
                "one or two languages expected, got {}",
                langs.len()
            )));
        }
        let splits = [
            (Split::Train, &request.train),
            (Split::Dev, &request.dev),
            (Split::Test, &request.tests),
        ];
        let mut tasks = Vec::new();
        let mut seen = HashSet::new();
        for (split, ids) in splits {
            for did in ids {
                let entry = self.catalog.get(did)?;
                // one entry per request: outputs are keyed by id
                if !seen.insert(&entry.did) {
                    return Err(Error::CatalogLookup(format!(
                        "{} is requested more than once",
                        entry.did
                    )));
                }
                let swap = match (langs.as_slice(), entry.did.pair()) {
                    ([l1, l2], Some(pair)) => {
                        let (compatible, swap) = check_compat_swap(&(*l1, *l2), &pair)?;
                        if !compatible {
                            return Err(Error::CatalogLookup(format!(
                                "{} does not match the requested languages {}-{}",
                                entry.did, l1, l2
                            )));
                        }
                        swap
                    }
                    ([l1], None) if l1.is_compatible(&entry.did.langs()[0]) => false,
                    _ => {
                        return Err(Error::CatalogLookup(format!(
                            "{} does not match the requested languages",
                            entry.did
                        )))
                    }
                };
                let (dir, compress) = match split {
                    Split::Train => (TRAIN_PARTS_DIR, self.opts.compress),
                    Split::Dev | Split::Test => (TESTS_DIR, false),
                };
                tasks.push((
                    split,
                    EntryTask {
                        entry: entry.clone(),
                        langs: langs.clone(),
                        swap,
                        out_dir: self.out_dir.join(dir),
                        compress,
                        extra_meta: self.opts.extra_meta,
                    },
                ));
            }
        }
        Ok(tasks)
    }

    fn run_tasks(&self, tasks: &[EntryTask]) -> Result<Vec<Result<EntryReport, Error>>, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.opts.n_jobs.max(1))
            .build()?;
        info!(
            "processing {} entries with {} worker(s)",
            tasks.len(),
            self.opts.n_jobs.max(1)
        );
        let cache = self.cache;
        if self.opts.fail_fast {
            let reports: Vec<EntryReport> = pool.install(|| {
                tasks
                    .par_iter()
                    .map(|task| process_entry(cache, task))
                    .collect::<Result<Vec<_>, _>>()
            })?;
            Ok(reports.into_iter().map(Ok).collect())
        } else {
            Ok(pool.install(|| {
                tasks
                    .par_iter()
                    .map(|task| process_entry(cache, task))
                    .collect()
            }))
        }
    }

    pub fn assemble(&self, request: &Request) -> Result<AssembleReport, Error> {
        let planned = self.plan(request)?;
        std::fs::create_dir_all(&self.out_dir)?;
        self.write_signature(request)?;

        let (splits, tasks): (Vec<Split>, Vec<EntryTask>) = planned.into_iter().unzip();
        let results = self.run_tasks(&tasks)?;

        let mut report = AssembleReport::default();
        let mut done: Vec<(Split, EntryReport)> = Vec::new();
        for ((split, task), result) in splits.into_iter().zip(&tasks).zip(results) {
            match result {
                Ok(r) => {
                    report.entries.push(r.clone());
                    done.push((split, r));
                }
                Err(e) => {
                    error!("[{}] failed: {}", task.entry.did, e);
                    report.failed.push((task.entry.did.to_string(), e.to_string()));
                }
            }
        }
        if !report.failed.is_empty() {
            self.write_errors(&report.failed)?;
            warn!(
                "{} of {} entries failed, see {:?}",
                report.failed.len(),
                tasks.len(),
                self.out_dir.join("errors.tsv")
            );
        }

        let of_split = |wanted: Split| -> Vec<&EntryReport> {
            done.iter()
                .filter(|(s, _)| *s == wanted)
                .map(|(_, r)| r)
                .collect()
        };
        let tests = of_split(Split::Test);
        let devs = of_split(Split::Dev);
        self.link_tests(&tests, &request.langs)?;
        self.build_dev(&devs, &request.langs)?;

        let trains = of_split(Split::Train);
        if self.opts.merge && !trains.is_empty() {
            let held_out: Vec<Vec<PathBuf>> = tests
                .iter()
                .chain(devs.iter())
                .map(|r| r.paths.clone())
                .collect();
            let hashes = if self.opts.drop_tests {
                load_test_hashes(&held_out)?
            } else {
                Default::default()
            };
            let parts: Vec<(String, Vec<PathBuf>)> = trains
                .iter()
                .map(|r| (r.did.clone(), r.paths.clone()))
                .collect();
            let merge_opts = MergeOptions {
                compress: self.opts.compress,
                drop_dupes: self.opts.drop_dupes,
                drop_tests: self.opts.drop_tests,
            };
            report.merge = Some(merge_parts(
                &parts,
                &hashes,
                &request.langs,
                &self.out_dir,
                &merge_opts,
            )?);
        }
        Ok(report)
    }

    /// `test<N>.<lang>` symlinks, numbered in request order.
    fn link_tests(&self, tests: &[&EntryReport], langs: &[LanguageTag]) -> Result<(), Error> {
        for (i, test) in tests.iter().enumerate() {
            for (lang, path) in langs.iter().zip(&test.paths) {
                let link = self.out_dir.join(format!("test{}.{}", i + 1, lang));
                link_or_copy(path, &link)?;
            }
        }
        Ok(())
    }

    /// `dev.<lang>`: a link to a single dev set, or the concatenation of several.
    fn build_dev(&self, devs: &[&EntryReport], langs: &[LanguageTag]) -> Result<(), Error> {
        match devs {
            [] => Ok(()),
            [single] => {
                for (lang, path) in langs.iter().zip(&single.paths) {
                    link_or_copy(path, &lang_path(&self.out_dir, "dev", lang, false))?;
                }
                Ok(())
            }
            many => {
                for (i, lang) in langs.iter().enumerate() {
                    let dev = lang_path(&self.out_dir, "dev", lang, false);
                    remove_existing(&dev)?;
                    let mut out = BufWriter::new(File::create(&dev)?);
                    for part in many {
                        let mut reader = open_text(&part.paths[i])?;
                        std::io::copy(&mut reader, &mut out)?;
                    }
                    out.flush()?;
                    info!("concatenated {} dev sets into {:?}", many.len(), dev);
                }
                Ok(())
            }
        }
    }

    fn write_errors(&self, failed: &[(String, String)]) -> Result<(), Error> {
        let mut out = BufWriter::new(File::create(self.out_dir.join("errors.tsv"))?);
        for (did, message) in failed {
            let message = message.replace(['\t', '\n'], " ");
            writeln!(out, "{did}\t{message}")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Appends the invocation to `mtdata.signature.txt`.
    fn write_signature(&self, request: &Request) -> Result<(), Error> {
        let join = |ids: &[DatasetId]| {
            ids.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        let langs: Vec<String> = request.langs.iter().map(|l| l.to_string()).collect();
        let mut line = format!("mtdata get -l {}", langs.join("-"));
        for (flag, ids) in [("--train", &request.train), ("--dev", &request.dev), ("--test", &request.tests)] {
            if !ids.is_empty() {
                line.push_str(&format!(" {flag} {}", join(ids)));
            }
        }
        let flags = [
            ("--merge", self.opts.merge),
            ("--compress", self.opts.compress),
            ("--dedupe", self.opts.drop_dupes),
            ("--drop-tests", self.opts.drop_tests),
        ];
        for (flag, set) in flags {
            if set {
                line.push(' ');
                line.push_str(flag);
            }
        }
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.out_dir.join("mtdata.signature.txt"))?;
        writeln!(out, "{line}\n#mtdata v{}", env!("CARGO_PKG_VERSION"))?;
        Ok(())
    }
}

fn remove_existing(path: &Path) -> Result<(), Error> {
    if path.symlink_metadata().is_ok() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Points `link` at `target` with a relative symlink, copying where symlinks are unavailable.
fn link_or_copy(target: &Path, link: &Path) -> Result<(), Error> {
    remove_existing(link)?;
    #[cfg(unix)]
    {
        let relative = match (target.parent(), link.parent()) {
            (Some(t), Some(l)) => match t.strip_prefix(l) {
                Ok(rel) => rel.join(target.file_name().unwrap_or_default()),
                Err(_) => target.to_path_buf(),
            },
            _ => target.to_path_buf(),
        };
        std::os::unix::fs::symlink(relative, link)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::copy(target, link)?;
    }
    Ok(())
}
