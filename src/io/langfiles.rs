/*! Language files management.

A [LangFiles] holds one writer per language of a dataset, plus an optional metadata sidecar.
Lines written through it are kept aligned across languages.
!*/
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::Error;
use crate::lang::LanguageTag;

use super::textio::{create_text, TextWriter};

/// `<dir>/<stem>.<lang>[.gz]`
pub fn lang_path(dir: &Path, stem: &str, lang: &LanguageTag, compress: bool) -> PathBuf {
    let mut name = format!("{stem}.{lang}");
    if compress {
        name.push_str(".gz");
    }
    dir.join(name)
}

/// `<dir>/<stem>.meta.jsonl.gz`
pub fn meta_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}.meta.jsonl.gz"))
}

/// Holds aligned writers, one per language.
pub struct LangFiles {
    paths: Vec<PathBuf>,
    writers: Vec<TextWriter>,
    meta: Option<TextWriter>,
    nb_lines: usize,
}

impl LangFiles {
    /// Create (truncating) the files for `stem` in `dir`, one per language of `langs`.
    pub fn create(
        dir: &Path,
        stem: &str,
        langs: &[LanguageTag],
        compress: bool,
        with_meta: bool,
    ) -> Result<Self, Error> {
        let paths: Vec<PathBuf> = langs
            .iter()
            .map(|lang| lang_path(dir, stem, lang, compress))
            .collect();
        let mut writers = Vec::with_capacity(paths.len());
        for path in &paths {
            debug!("creating {:?}", path);
            writers.push(create_text(path)?);
        }
        let meta = if with_meta {
            Some(create_text(&meta_path(dir, stem))?)
        } else {
            None
        };
        Ok(Self {
            paths,
            writers,
            meta,
            nb_lines: 0,
        })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Writes one line per language. `segments` must have one element per language.
    pub fn write(
        &mut self,
        segments: &[String],
        meta: Option<&BTreeMap<String, String>>,
    ) -> Result<(), Error> {
        if segments.len() != self.writers.len() {
            return Err(Error::Format(format!(
                "got {} segments for {} languages",
                segments.len(),
                self.writers.len()
            )));
        }
        for (writer, segment) in self.writers.iter_mut().zip(segments) {
            writer.write_all(segment.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        if let Some(meta_writer) = &mut self.meta {
            let empty = BTreeMap::new();
            serde_json::to_writer(&mut *meta_writer, meta.unwrap_or(&empty))?;
            meta_writer.write_all(b"\n")?;
        }
        self.nb_lines += 1;
        Ok(())
    }

    /// Flushes and closes every file, returning the number of lines written.
    pub fn finish(self) -> Result<usize, Error> {
        for writer in self.writers {
            writer.finish()?;
        }
        if let Some(meta) = self.meta {
            meta.finish()?;
        }
        Ok(self.nb_lines)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_aligned_write() {
        let dst = tempdir().unwrap();
        let langs = [
            LanguageTag::parse("en").unwrap(),
            LanguageTag::parse("fr").unwrap(),
        ];
        let mut lf = LangFiles::create(dst.path(), "corpus", &langs, false, false).unwrap();
        lf.write(&["hello".to_string(), "bonjour".to_string()], None)
            .unwrap();
        assert!(lf.write(&["only one".to_string()], None).is_err());
        let paths = lf.paths().to_vec();
        assert_eq!(lf.finish().unwrap(), 1);

        assert_eq!(paths[0], dst.path().join("corpus.eng"));
        assert_eq!(std::fs::read_to_string(&paths[0]).unwrap(), "hello\n");
        assert_eq!(std::fs::read_to_string(&paths[1]).unwrap(), "bonjour\n");
    }

    #[test]
    fn test_compressed_write_is_complete() {
        let dst = tempdir().unwrap();
        let langs = [LanguageTag::parse("de").unwrap()];
        let mut lf = LangFiles::create(dst.path(), "part", &langs, true, true).unwrap();
        let mut meta = BTreeMap::new();
        meta.insert("docid".to_string(), "d1".to_string());
        lf.write(&["Hallo".to_string()], Some(&meta)).unwrap();
        let path = lf.paths()[0].clone();
        lf.finish().unwrap();

        let text = crate::io::textio::read_to_string(crate::io::open_text(&path).unwrap()).unwrap();
        assert_eq!(text, "Hallo\n");
        let sidecar = meta_path(dst.path(), "part");
        let meta_text = crate::io::textio::read_to_string(crate::io::open_text(&sidecar).unwrap()).unwrap();
        assert_eq!(meta_text, "{\"docid\":\"d1\"}\n");
    }
}
