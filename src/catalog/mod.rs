/*! Catalog of known datasets.

A [Catalog] is an explicit value: entries are added programmatically or loaded from a
versioned JSON snapshot with [Catalog::load]. There is no process-wide index.
!*/
mod dataset_id;
mod entry;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

pub use dataset_id::DatasetId;
pub use entry::{Entry, ARCHIVE_EXTS};

use crate::error::Error;
use crate::lang::LanguageTag;

/// Snapshot format version, bumped with the crate.
pub const SNAPSHOT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: String,
    entries: Vec<Entry>,
}

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    entries: Vec<Entry>,
    index: HashMap<DatasetId, usize>,
}

/// Unordered bitext language match, exact or by compatibility.
fn bitext_match(requested: &[LanguageTag], candidate: &[LanguageTag], fuzzy: bool) -> bool {
    let mut x: Vec<LanguageTag> = requested.to_vec();
    let mut y: Vec<LanguageTag> = candidate.to_vec();
    x.sort();
    y.sort();
    if fuzzy {
        let direct = x[0].is_compatible(&y[0]) && x[1].is_compatible(&y[1]);
        let crossed = x[0].is_compatible(&y[1]) && x[1].is_compatible(&y[0]);
        direct || crossed
    } else {
        x == y
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a validated entry. Duplicate dataset ids are rejected.
    pub fn add_entry(&mut self, entry: Entry) -> Result<(), Error> {
        entry.validate()?;
        if self.index.contains_key(&entry.did) {
            return Err(Error::CatalogLookup(format!("{} is a duplicate", entry.did)));
        }
        debug!("adding {}", entry.did);
        self.index.insert(entry.did.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn contains(&self, did: &DatasetId) -> bool {
        self.index.contains_key(did)
    }

    /// Looks up an entry, also trying the id with its languages reversed.
    pub fn get(&self, did: &DatasetId) -> Result<&Entry, Error> {
        self.index
            .get(did)
            .or_else(|| self.index.get(&did.reversed()))
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| Error::CatalogLookup(format!("{did} is not a known dataset id")))
    }

    /// Filters entries by languages, names and groups.
    ///
    /// Bitext languages are matched regardless of order; a single language selects
    /// monolingual entries of a compatible language.
    pub fn find(
        &self,
        langs: Option<&[LanguageTag]>,
        names: &[String],
        groups: &[String],
        fuzzy: bool,
    ) -> Vec<&Entry> {
        let names: HashSet<String> = names.iter().map(|n| n.to_lowercase()).collect();
        let groups: HashSet<String> = groups.iter().map(|g| g.to_lowercase()).collect();
        self.entries
            .iter()
            .filter(|e| groups.is_empty() || groups.contains(&e.did.group().to_lowercase()))
            .filter(|e| names.is_empty() || names.contains(&e.did.name().to_lowercase()))
            .filter(|e| match langs {
                None => true,
                Some(langs) if langs.len() == 2 => {
                    e.did.is_bitext() && bitext_match(langs, e.did.langs(), fuzzy)
                }
                Some(langs) => {
                    !e.did.is_bitext()
                        && langs
                            .first()
                            .map(|l| l.is_compatible(&e.did.langs()[0]))
                            .unwrap_or(false)
                }
            })
            .collect()
    }

    /// Loads a snapshot written by [Catalog::save].
    pub fn load(path: &Path) -> Result<Self, Error> {
        info!("loading catalog from {:?}", path);
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::CatalogLookup(format!(
                "catalog snapshot {:?} has version {} but {} is expected; rebuild the snapshot",
                path, snapshot.version, SNAPSHOT_VERSION
            )));
        }
        let mut catalog = Self::new();
        for entry in snapshot.entries {
            catalog.add_entry(entry)?;
        }
        info!("loaded {} entries", catalog.len());
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let writer = BufWriter::new(File::create(path)?);
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION.to_string(),
            entries: self.entries.clone(),
        };
        serde_json::to_writer_pretty(writer, &snapshot)?;
        info!("wrote {} entries to {:?}", self.len(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::formats::FormatKind;

    fn did(s: &str) -> DatasetId {
        DatasetId::parse(s).unwrap()
    }

    fn sample() -> Catalog {
        let mut c = Catalog::new();
        c.add_entry(Entry::new(
            did("Statmt-news_commentary-16-deu-eng"),
            "http://data.statmt.org/nc-v16.de-en.tsv.gz",
        ))
        .unwrap();
        c.add_entry(
            Entry::new(did("Statmt-europarl-7-fra-eng"), "http://x.org/fr-en.tgz")
                .with_in_paths(&["*.fr", "*.en"])
                .with_in_ext(FormatKind::Plain),
        )
        .unwrap();
        c.add_entry(Entry::new(did("Leipzig-news-2020-eng"), "http://x.org/news.txt"))
            .unwrap();
        c
    }

    #[test]
    fn test_get() {
        let c = sample();
        assert!(c.get(&did("Statmt-news_commentary-16-deu-eng")).is_ok());
        assert!(c.get(&did("Statmt-news_commentary-16-eng-deu")).is_ok());
        assert!(matches!(
            c.get(&did("Statmt-news_commentary-15-deu-eng")),
            Err(Error::CatalogLookup(_))
        ));
    }

    #[test]
    fn test_duplicate() {
        let mut c = sample();
        let dupe = Entry::new(did("Leipzig-news-2020-eng"), "http://x.org/other.txt");
        assert!(c.add_entry(dupe).is_err());
    }

    #[test]
    fn test_find() {
        let c = sample();
        let en_de = [LanguageTag::parse("en").unwrap(), LanguageTag::parse("de").unwrap()];
        assert_eq!(c.find(Some(&en_de), &[], &[], false).len(), 1);
        let en = [LanguageTag::parse("en-GB").unwrap()];
        assert_eq!(c.find(Some(&en), &[], &[], true).len(), 1);
        assert_eq!(c.find(None, &[], &["statmt".to_string()], false).len(), 2);
        assert_eq!(c.find(None, &["europarl".to_string()], &[], false).len(), 1);
    }

    #[test]
    fn test_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let c = sample();
        c.save(&path).unwrap();
        let loaded = Catalog::load(&path).unwrap();
        assert_eq!(loaded.entries(), c.entries());
    }
}
