use std::path::Path;

use mtdata::cache::Cache;
use mtdata::catalog::{Catalog, DatasetId, Entry};
use mtdata::error::Error;
use mtdata::formats::FormatKind;
use mtdata::lang::{parse_pair, LanguageTag};
use mtdata::processing::{AssembleOptions, Assembler, Request};
use tempfile::{tempdir, TempDir};
use url::Url;

fn did(s: &str) -> DatasetId {
    DatasetId::parse(s).unwrap()
}

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    Url::from_file_path(&path).unwrap().to_string()
}

fn lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

fn eng_fra() -> Vec<LanguageTag> {
    let (a, b) = parse_pair("eng-fra").unwrap();
    vec![a, b]
}

/// Sources on disk, and a catalog pointing at them.
fn setup() -> (TempDir, Catalog) {
    let src = tempdir().unwrap();
    let dir = src.path();
    let mut catalog = Catalog::new();

    // plain text, one file per side, catalog order eng-fra
    let en = write(dir, "plain.en", "Hello\nGood  morning \nHow are you?\n");
    let fr = write(dir, "plain.fr", "Bonjour\nBon matin\nComment vas-tu ?\n");
    catalog
        .add_entry(Entry::new(did("Test-plain-1-eng-fra"), &en).with_urls(&[en.clone(), fr.clone()]))
        .unwrap();

    // tsv tagged fra-eng: sides must be swapped
    let tsv = write(dir, "tsv.tsv", "Merci\tThanks\nBonjour\tHello\n\tempty side\n");
    catalog
        .add_entry(Entry::new(did("Test-tsv-1-fra-eng"), &tsv))
        .unwrap();

    // tmx
    let tmx = write(
        dir,
        "memory.tmx",
        r#"<?xml version="1.0"?>
<tmx version="1.4"><header/><body>
<tu><tuv xml:lang="fr"><seg>Au revoir</seg></tuv><tuv xml:lang="en"><seg>Goodbye</seg></tuv></tu>
<tu><tuv xml:lang="en"><seg>Thanks</seg></tuv><tuv xml:lang="fr"><seg>Merci</seg></tuv></tu>
</body></tmx>"#,
    );
    catalog
        .add_entry(Entry::new(did("Test-memory-1-eng-fra"), &tmx))
        .unwrap();

    // held-out set sharing a pair with train
    let test_en = write(dir, "test.en", "How are you?\nSee you\n");
    let test_fr = write(dir, "test.fr", "Comment vas-tu ?\nA plus\n");
    catalog
        .add_entry(Entry::new(did("Test-heldout-1-eng-fra"), &test_en).with_urls(&[test_en.clone(), test_fr]))
        .unwrap();

    // broken: unequal sides
    let bad_fr = write(dir, "bad.fr", "Un\n");
    catalog
        .add_entry(Entry::new(did("Test-broken-1-eng-fra"), &en).with_urls(&[en, bad_fr]))
        .unwrap();

    // monolingual
    let mono = write(dir, "news.txt", "First line\n\nSecond   line\n");
    catalog
        .add_entry(Entry::new(did("Test-news-1-eng"), &mono).with_in_ext(FormatKind::Plain))
        .unwrap();

    (src, catalog)
}

#[test_log::test]
fn swapped_entry_follows_requested_order() {
    let (_src, catalog) = setup();
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    let cache = Cache::new(root.path()).unwrap();

    let request = Request {
        langs: eng_fra(),
        train: vec![did("Test-tsv-1-fra-eng")],
        ..Default::default()
    };
    let report = Assembler::new(&catalog, &cache, out.path(), AssembleOptions::default())
        .assemble(&request)
        .unwrap();
    report.check().unwrap();
    assert_eq!(report.entries[0].good, 2);
    assert_eq!(report.entries[0].skipped, 1);

    let parts = out.path().join("train-parts");
    assert_eq!(
        lines(&parts.join("Test-tsv-1-fra-eng.eng")),
        vec!["Thanks", "Hello"]
    );
    assert_eq!(
        lines(&parts.join("Test-tsv-1-fra-eng.fra")),
        vec!["Merci", "Bonjour"]
    );
    assert!(out.path().join("mtdata.signature.txt").exists());
}

#[test]
fn merge_drops_dupes_and_test_overlap() {
    let (_src, catalog) = setup();
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    let cache = Cache::new(root.path()).unwrap();

    let request = Request {
        langs: eng_fra(),
        train: vec![
            did("Test-plain-1-eng-fra"),
            did("Test-tsv-1-fra-eng"),
            did("Test-memory-1-eng-fra"),
        ],
        tests: vec![did("Test-heldout-1-eng-fra")],
        ..Default::default()
    };
    let opts = AssembleOptions {
        merge: true,
        drop_dupes: true,
        drop_tests: true,
        n_jobs: 2,
        ..Default::default()
    };
    let report = Assembler::new(&catalog, &cache, out.path(), opts)
        .assemble(&request)
        .unwrap();
    report.check().unwrap();

    let stats = report.merge.unwrap();
    // "Hello/Bonjour" is in plain and tsv, "Thanks/Merci" in tsv and tmx
    assert_eq!(stats.dupes, 2);
    // "How are you?" is a test pair
    assert_eq!(stats.test_overlap, 1);
    assert_eq!(stats.total, 4);
    assert_eq!(stats.parts["Test-tsv-1-fra-eng"].dupes, 1);
    assert_eq!(stats.parts["Test-memory-1-eng-fra"].dupes, 1);

    let train_en = lines(&out.path().join("train.eng"));
    let train_fr = lines(&out.path().join("train.fra"));
    assert_eq!(train_en, vec!["Hello", "Good morning", "Thanks", "Goodbye"]);
    assert_eq!(train_fr, vec!["Bonjour", "Bon matin", "Merci", "Au revoir"]);
    assert!(!train_en.contains(&"How are you?".to_string()));

    assert_eq!(
        lines(&out.path().join("test1.eng")),
        vec!["How are you?", "See you"]
    );
    assert!(out.path().join("train.stats.json").exists());
    assert!(out.path().join("train.meta.gz").exists());
}

#[test]
fn failures_are_isolated_and_recorded() {
    let (_src, catalog) = setup();
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    let cache = Cache::new(root.path()).unwrap();

    let request = Request {
        langs: eng_fra(),
        train: vec![did("Test-broken-1-eng-fra"), did("Test-plain-1-eng-fra")],
        ..Default::default()
    };
    let report = Assembler::new(&catalog, &cache, out.path(), AssembleOptions::default())
        .assemble(&request)
        .unwrap();
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.check(),
        Err(Error::PartialFailure {
            failed: 1,
            total: 2
        })
    ));
    let errors = std::fs::read_to_string(out.path().join("errors.tsv")).unwrap();
    assert!(errors.starts_with("Test-broken-1-eng-fra\t"));

    let fail_fast = AssembleOptions {
        fail_fast: true,
        ..Default::default()
    };
    let out2 = tempdir().unwrap();
    let res = Assembler::new(&catalog, &cache, out2.path(), fail_fast).assemble(&request);
    assert!(matches!(res, Err(Error::Format(_))));
}

#[test]
fn unknown_ids_fail_before_fetching() {
    let (_src, catalog) = setup();
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    let cache = Cache::new(root.path()).unwrap();

    let request = Request {
        langs: eng_fra(),
        train: vec![did("Test-plain-1-eng-fra"), did("Test-nothere-1-eng-fra")],
        ..Default::default()
    };
    let res = Assembler::new(&catalog, &cache, out.path(), AssembleOptions::default())
        .assemble(&request);
    assert!(matches!(res, Err(Error::CatalogLookup(_))));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn reruns_reuse_completed_entries() {
    let (_src, catalog) = setup();
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    let cache = Cache::new(root.path()).unwrap();
    let request = Request {
        langs: eng_fra(),
        train: vec![did("Test-plain-1-eng-fra")],
        dev: vec![did("Test-heldout-1-eng-fra")],
        ..Default::default()
    };
    let assembler = Assembler::new(&catalog, &cache, out.path(), AssembleOptions::default());
    let first = assembler.assemble(&request).unwrap();
    assert!(first.entries.iter().all(|e| !e.reused));
    let second = assembler.assemble(&request).unwrap();
    assert!(second.entries.iter().all(|e| e.reused));

    assert_eq!(lines(&out.path().join("dev.fra")), vec!["Comment vas-tu ?", "A plus"]);
    let signature = std::fs::read_to_string(out.path().join("mtdata.signature.txt")).unwrap();
    assert_eq!(signature.matches("mtdata get").count(), 2);
}

#[test]
fn monolingual_dataset() {
    let (_src, catalog) = setup();
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    let cache = Cache::new(root.path()).unwrap();
    let request = Request {
        langs: vec![LanguageTag::parse("en").unwrap()],
        train: vec![did("Test-news-1-eng")],
        ..Default::default()
    };
    let opts = AssembleOptions {
        merge: true,
        compress: true,
        ..Default::default()
    };
    let report = Assembler::new(&catalog, &cache, out.path(), opts)
        .assemble(&request)
        .unwrap();
    assert_eq!(report.entries[0].good, 2);
    assert_eq!(report.entries[0].skipped, 1);
    assert_eq!(report.merge.unwrap().total, 2);
    assert!(out.path().join("train.eng.gz").exists());
}

#[test]
fn mismatched_languages_are_rejected() {
    let (_src, catalog) = setup();
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    let cache = Cache::new(root.path()).unwrap();
    let (de, en) = parse_pair("deu-eng").unwrap();
    let request = Request {
        langs: vec![de, en],
        train: vec![did("Test-plain-1-eng-fra")],
        ..Default::default()
    };
    let res = Assembler::new(&catalog, &cache, out.path(), AssembleOptions::default())
        .assemble(&request);
    assert!(matches!(res, Err(Error::CatalogLookup(_))));
}

#[test]
fn repeated_ids_are_rejected() {
    let (_src, catalog) = setup();
    let root = tempdir().unwrap();
    let out = tempdir().unwrap();
    let cache = Cache::new(root.path()).unwrap();
    let assembler = Assembler::new(
        &catalog,
        &cache,
        out.path(),
        AssembleOptions {
            merge: true,
            n_jobs: 2,
            ..Default::default()
        },
    );

    let twice = Request {
        langs: eng_fra(),
        train: vec![did("Test-plain-1-eng-fra"), did("Test-plain-1-eng-fra")],
        ..Default::default()
    };
    assert!(matches!(assembler.assemble(&twice), Err(Error::CatalogLookup(_))));

    // the same entry reached through its reversed id, in another split
    let across = Request {
        langs: eng_fra(),
        train: vec![did("Test-tsv-1-fra-eng")],
        tests: vec![did("Test-tsv-1-eng-fra")],
        ..Default::default()
    };
    assert!(matches!(assembler.assemble(&across), Err(Error::CatalogLookup(_))));

    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    assert!(!out.path().join("train.eng").exists());
}
