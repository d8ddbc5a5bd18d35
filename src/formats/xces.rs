/*! OPUS XCES alignments.

An alignment file lists, per pair of documents (`<linkGrp fromDoc=".." toDoc="..">`), links
between sentence ids (`<link xtargets="s1 s2;s1" certainty="0.8"/>`). The documents live in two
zip archives, one per language, as XML files whose `<s id="..">` elements hold the sentences.

[AlignmentResolver] walks the link groups, opening only the two documents each group refers to.
Missing documents or sentence ids skip the affected links and are counted; they never abort the
corpus.
!*/
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;

use flate2::read::MultiGzDecoder;
use log::{debug, info, warn};
use roxmltree::{Document, ParsingOptions};
use zip::ZipArchive;

use crate::cache::VirtualFile;
use crate::error::Error;
use crate::io::textio::read_to_string;

use super::{FormatReader, ReadOptions, Record, Segments};

#[derive(Debug, Clone, PartialEq)]
struct Link {
    certainty: f32,
    src: Vec<String>,
    tgt: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct LinkGroup {
    from_doc: String,
    to_doc: String,
    links: Vec<Link>,
}

fn xml_options() -> ParsingOptions {
    ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    }
}

/// Parses the alignment file content. Returns the groups and the number of malformed links.
fn parse_alignments(content: &str) -> Result<(Vec<LinkGroup>, usize), Error> {
    let doc = Document::parse_with_options(content, xml_options())?;
    let mut malformed = 0;
    let mut groups = Vec::new();
    for grp in doc.descendants().filter(|n| n.has_tag_name("linkGrp")) {
        let (from_doc, to_doc) = match (grp.attribute("fromDoc"), grp.attribute("toDoc")) {
            (Some(f), Some(t)) => (f.to_string(), t.to_string()),
            _ => {
                warn!("linkGrp without fromDoc/toDoc skipped");
                continue;
            }
        };
        let mut links = Vec::new();
        for link in grp.descendants().filter(|n| n.has_tag_name("link")) {
            let targets: Vec<&str> = link.attribute("xtargets").unwrap_or(";").split(';').collect();
            if targets.len() != 2 {
                malformed += 1;
                continue;
            }
            let certainty = link
                .attribute("certainty")
                .and_then(|c| c.trim().parse::<f32>().ok())
                .unwrap_or(f32::NEG_INFINITY);
            links.push(Link {
                certainty,
                src: targets[0].split_whitespace().map(String::from).collect(),
                tgt: targets[1].split_whitespace().map(String::from).collect(),
            });
        }
        groups.push(LinkGroup {
            from_doc,
            to_doc,
            links,
        });
    }
    Ok((groups, malformed))
}

/// Sentence id to text. Sentences made of `<w>` tokens are joined with spaces.
fn parse_document(content: &str) -> Result<HashMap<String, String>, Error> {
    let doc = Document::parse_with_options(content, xml_options())?;
    let mut sentences = HashMap::new();
    for s in doc.descendants().filter(|n| n.has_tag_name("s")) {
        let id = match s.attribute("id") {
            Some(id) => id.to_string(),
            None => continue,
        };
        let words: Vec<&str> = s
            .descendants()
            .filter(|n| n.has_tag_name("w"))
            .filter_map(|w| w.text())
            .collect();
        let text = if words.is_empty() {
            s.descendants()
                .filter(|d| d.is_text())
                .filter_map(|d| d.text())
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            words.join(" ")
        };
        sentences.insert(id, text);
    }
    Ok(sentences)
}

/// Lookup keys of a document name: itself, without `.gz`, and without the leading
/// `<corpus>/xml/` directory that OPUS archives use.
fn doc_keys(name: &str) -> Vec<String> {
    let mut keys = vec![name.to_string()];
    if let Some(pos) = name.find("/xml/") {
        keys.push(name[pos + 5..].to_string());
    }
    let stripped: Vec<String> = keys
        .iter()
        .filter_map(|k| k.strip_suffix(".gz").map(String::from))
        .collect();
    keys.extend(stripped);
    keys
}

/// Per-document zip archive of one language.
struct DocArchive {
    name: String,
    zip: ZipArchive<File>,
    index: HashMap<String, String>,
}

impl DocArchive {
    fn open(file: &VirtualFile) -> Result<Self, Error> {
        let path = file.materialize()?;
        let zip = ZipArchive::new(File::open(&path)?)?;
        let mut index = HashMap::new();
        for member in zip.file_names().filter(|n| !n.ends_with('/')) {
            index.insert(member.to_string(), member.to_string());
        }
        let members: Vec<String> = index.keys().cloned().collect();
        for member in members {
            for key in doc_keys(&member).into_iter().skip(1) {
                index.entry(key).or_insert_with(|| member.clone());
            }
        }
        debug!("{}: {} documents", file.name(), index.len());
        Ok(Self {
            name: file.name(),
            zip,
            index,
        })
    }

    fn find(&self, doc: &str) -> Option<&String> {
        doc_keys(doc).iter().find_map(|k| self.index.get(k))
    }

    /// Sentences of `doc`, or [None] when the archive does not hold it.
    fn read(&mut self, doc: &str) -> Result<Option<HashMap<String, String>>, Error> {
        let member = match self.find(doc) {
            Some(m) => m.clone(),
            None => return Ok(None),
        };
        let mut raw = Vec::new();
        let entry = self.zip.by_name(&member)?;
        if member.ends_with(".gz") {
            MultiGzDecoder::new(entry).read_to_end(&mut raw)?;
        } else {
            let mut entry = entry;
            entry.read_to_end(&mut raw)?;
        }
        let content = String::from_utf8_lossy(&raw);
        parse_document(&content).map(Some)
    }
}

/// Skip counters of an alignment pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AlignStats {
    pub success: usize,
    pub doc_not_found: usize,
    pub doc_errors: usize,
    pub malformed_links: usize,
    pub missing_seg_skips: usize,
    pub low_conf_skips: usize,
    pub error_seg_skips: usize,
}

/// Lazily yields sentence pairs, one document pair at a time.
pub struct AlignmentResolver {
    groups: std::vec::IntoIter<LinkGroup>,
    l1: DocArchive,
    l2: DocArchive,
    min_confidence: Option<f32>,
    extra_meta: bool,
    pending: std::vec::IntoIter<Record>,
    stats: AlignStats,
    done: bool,
}

impl AlignmentResolver {
    pub fn open(
        alignments: &VirtualFile,
        l1_docs: &VirtualFile,
        l2_docs: &VirtualFile,
        opts: &ReadOptions,
    ) -> Result<Self, Error> {
        let content = read_to_string(alignments.open_for_read()?)?;
        let (groups, malformed) = parse_alignments(&content)?;
        info!(
            "{}: {} document pairs to align",
            alignments.name(),
            groups.len()
        );
        Ok(Self {
            groups: groups.into_iter(),
            l1: DocArchive::open(l1_docs)?,
            l2: DocArchive::open(l2_docs)?,
            min_confidence: opts.min_confidence,
            extra_meta: opts.extra_meta,
            pending: Vec::new().into_iter(),
            stats: AlignStats {
                malformed_links: malformed,
                ..Default::default()
            },
            done: false,
        })
    }

    pub fn stats(&self) -> &AlignStats {
        &self.stats
    }

    fn align_group(&mut self, group: LinkGroup) -> Result<Vec<Record>, Error> {
        let docs = (self.l1.read(&group.from_doc), self.l2.read(&group.to_doc));
        let (src_doc, tgt_doc) = match docs {
            (Ok(Some(s)), Ok(Some(t))) => (s, t),
            (Ok(_), Ok(_)) => {
                debug!("{} / {} not found", group.from_doc, group.to_doc);
                self.stats.doc_not_found += 1;
                return Ok(Vec::new());
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(
                    "could not read {} / {}: {}",
                    group.from_doc, group.to_doc, e
                );
                self.stats.doc_errors += 1;
                return Ok(Vec::new());
            }
        };

        let mut records = Vec::with_capacity(group.links.len());
        for link in group.links {
            if link.src.is_empty() || link.tgt.is_empty() {
                self.stats.missing_seg_skips += 1;
                continue;
            }
            if let Some(min) = self.min_confidence {
                if link.certainty < min {
                    self.stats.low_conf_skips += 1;
                    continue;
                }
            }
            let src: Option<Vec<&str>> = link.src.iter().map(|id| src_doc.get(id).map(String::as_str)).collect();
            let tgt: Option<Vec<&str>> = link.tgt.iter().map(|id| tgt_doc.get(id).map(String::as_str)).collect();
            match (src, tgt) {
                (Some(src), Some(tgt)) => {
                    let mut record = Record::new(vec![src.join(" "), tgt.join(" ")]);
                    if self.extra_meta {
                        record = record
                            .with_meta("src_doc", &group.from_doc)
                            .with_meta("tgt_doc", &group.to_doc);
                    }
                    records.push(record);
                    self.stats.success += 1;
                }
                _ => self.stats.error_seg_skips += 1,
            }
        }
        Ok(records)
    }
}

impl Iterator for AlignmentResolver {
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.next() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            match self.groups.next() {
                Some(group) => match self.align_group(group) {
                    Ok(records) => self.pending = records.into_iter(),
                    Err(e) => return Some(Err(e)),
                },
                None => {
                    self.done = true;
                    info!(
                        "aligned {} and {}: {:?}",
                        self.l1.name, self.l2.name, self.stats
                    );
                }
            }
        }
    }
}

pub struct XcesReader;

impl FormatReader for XcesReader {
    fn columns(&self) -> usize {
        2
    }

    fn read_file(&self, file: &VirtualFile, _opts: &ReadOptions) -> Result<Segments, Error> {
        Err(Error::Format(format!(
            "{} is an alignment file; the two document archives are also needed",
            file.name()
        )))
    }

    fn read(&self, files: &[VirtualFile], opts: &ReadOptions) -> Result<Segments, Error> {
        match files {
            [alignments, l1, l2] => Ok(Box::new(AlignmentResolver::open(alignments, l1, l2, opts)?)),
            _ => Err(Error::Format(format!(
                "alignment corpora need 3 files, got {}",
                files.len()
            ))),
        }
    }
}
