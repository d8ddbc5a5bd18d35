/*! Translation memory exchange (TMX).

Each `<tu>` holds `<tuv>` variants labeled with `xml:lang` (or `lang`).
When the languages of the source are known, the matching variants are picked by language tag
compatibility. Otherwise the file must hold exactly two distinct labels, taken in order of first
appearance.

Units lacking one of the two languages are dropped and counted. A file with no usable unit is an
error.

The document is parsed in memory, one file at a time.
!*/
use log::{debug, info, warn};
use roxmltree::{Document, Node, ParsingOptions};

use crate::cache::VirtualFile;
use crate::error::Error;
use crate::io::textio::read_to_string;
use crate::lang::LanguageTag;

use super::{unescape_html, FormatReader, ReadOptions, Record, Segments};

pub struct TmxReader;

struct Variant {
    label: String,
    text: String,
}

fn lang_label(tuv: Node) -> Option<String> {
    tuv.attributes()
        .find(|a| a.name() == "lang")
        .map(|a| a.value().to_string())
}

fn seg_text(tuv: Node) -> Option<String> {
    let seg = tuv.children().find(|c| c.has_tag_name("seg"))?;
    let text: String = seg
        .descendants()
        .filter(|d| d.is_text())
        .filter_map(|d| d.text())
        .collect();
    Some(unescape_html(text.trim()))
}

/// Which variant labels go to the first and second side.
enum Selector {
    Tags(LanguageTag, LanguageTag),
    Labels(String, String),
}

impl Selector {
    fn position(&self, variants: &[Variant], side: usize) -> Option<usize> {
        match self {
            Selector::Tags(a, b) => {
                let wanted = if side == 0 { a } else { b };
                let tags: Vec<Option<LanguageTag>> = variants
                    .iter()
                    .map(|v| LanguageTag::parse(&v.label).ok())
                    .collect();
                tags.iter()
                    .position(|t| t.as_ref() == Some(wanted))
                    .or_else(|| {
                        tags.iter()
                            .position(|t| t.map(|t| t.is_compatible(wanted)).unwrap_or(false))
                    })
            }
            Selector::Labels(a, b) => {
                let wanted = if side == 0 { a } else { b };
                variants.iter().position(|v| v.label.eq_ignore_ascii_case(wanted))
            }
        }
    }

    fn select(&self, variants: &[Variant]) -> Option<(usize, usize)> {
        let first = self.position(variants, 0)?;
        let second = self.position(variants, 1)?;
        if first == second {
            None
        } else {
            Some((first, second))
        }
    }
}

/// Labels of a file without declared languages. It must hold exactly two languages.
fn detect_labels(doc: &Document, name: &str) -> Result<Selector, Error> {
    let mut labels: Vec<String> = Vec::new();
    for tuv in doc.descendants().filter(|n| n.has_tag_name("tuv")) {
        if let Some(label) = lang_label(tuv) {
            if !labels.iter().any(|l| l.eq_ignore_ascii_case(&label)) {
                labels.push(label);
            }
        }
    }
    match labels.as_slice() {
        [a, b] => {
            debug!("{}: detected languages {} and {}", name, a, b);
            Ok(Selector::Labels(a.clone(), b.clone()))
        }
        _ => Err(Error::Format(format!(
            "{name} holds {} languages {:?}; the language pair must be given",
            labels.len(),
            labels
        ))),
    }
}

/// Parses TMX content into records with two segments.
pub fn parse_tmx(
    content: &str,
    langs: Option<(LanguageTag, LanguageTag)>,
    name: &str,
) -> Result<Vec<Record>, Error> {
    let opts = ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(content, opts)?;
    let selector = match langs {
        Some((a, b)) => Selector::Tags(a, b),
        None => detect_labels(&doc, name)?,
    };
    let mut records = Vec::new();
    let mut skips = 0;

    for tu in doc.descendants().filter(|n| n.has_tag_name("tu")) {
        let variants: Vec<Variant> = tu
            .children()
            .filter(|n| n.has_tag_name("tuv"))
            .filter_map(|tuv| {
                Some(Variant {
                    label: lang_label(tuv)?,
                    text: seg_text(tuv)?,
                })
            })
            .collect();
        match selector.select(&variants) {
            Some((i, j)) => {
                let mut record =
                    Record::new(vec![variants[i].text.clone(), variants[j].text.clone()]);
                if let Some(tuid) = tu.attribute("tuid") {
                    record = record.with_meta("tuid", tuid);
                }
                records.push(record);
            }
            None => {
                skips += 1;
                debug!(
                    "{}: skipped unit with languages {:?}",
                    name,
                    variants.iter().map(|v| v.label.as_str()).collect::<Vec<_>>()
                );
            }
        }
    }

    if records.is_empty() {
        return Err(Error::Format(format!(
            "{name} has no usable translation unit ({skips} skipped)"
        )));
    }
    if skips > 0 {
        warn!("{}: skipped {} units missing a language", name, skips);
    }
    info!("{}: parsed {} units", name, records.len());
    Ok(records)
}

impl FormatReader for TmxReader {
    fn columns(&self) -> usize {
        2
    }

    fn read_file(&self, file: &VirtualFile, opts: &ReadOptions) -> Result<Segments, Error> {
        let content = read_to_string(file.open_for_read()?)?;
        let records = parse_tmx(&content, opts.langs, &file.name())?;
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}
