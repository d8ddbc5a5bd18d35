/*! WMT21+ XML test sets.

```xml
<dataset id="wmttest2021">
  <collection id="general">
    <doc id="doc-1" origlang="en">
      <src lang="en"><p><seg id="1">...</seg></p></src>
      <ref lang="de" translator="A"><p><seg id="1">...</seg></p></ref>
    </doc>
  </collection>
</dataset>
```

Exactly one translation is used: the first `<ref>` of each document. Source and reference
segments are paired by position, a count mismatch is an error.
!*/
use log::info;
use roxmltree::{Document, Node, ParsingOptions};

use crate::cache::VirtualFile;
use crate::error::Error;
use crate::io::textio::read_to_string;

use super::{clean_text, FormatReader, ReadOptions, Record, Segments};

pub struct WmtReader;

fn segments(node: Option<Node>) -> Vec<String> {
    node.map(|n| {
        n.descendants()
            .filter(|d| d.has_tag_name("seg"))
            .map(|seg| {
                let text: String = seg
                    .descendants()
                    .filter(|d| d.is_text())
                    .filter_map(|d| d.text())
                    .collect();
                clean_text(&text)
            })
            .collect()
    })
    .unwrap_or_default()
}

pub fn parse_wmt_xml(content: &str, name: &str) -> Result<Vec<Record>, Error> {
    let opts = ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(content, opts)?;
    let mut records = Vec::new();
    for d in doc.descendants().filter(|n| n.has_tag_name("doc")) {
        let docid = d.attribute("id").unwrap_or_default();
        let srcs = segments(d.children().find(|c| c.has_tag_name("src")));
        let refs = segments(d.children().find(|c| c.has_tag_name("ref")));
        if srcs.len() != refs.len() {
            return Err(Error::Format(format!(
                "{name}: document {docid} has {} source but {} reference segments",
                srcs.len(),
                refs.len()
            )));
        }
        for (src, tgt) in srcs.into_iter().zip(refs) {
            let mut record = Record::new(vec![src, tgt]).with_meta("docid", docid);
            if let Some(origlang) = d.attribute("origlang") {
                record = record.with_meta("origlang", origlang);
            }
            records.push(record);
        }
    }
    info!("read {} segments from {}", records.len(), name);
    Ok(records)
}

impl FormatReader for WmtReader {
    fn columns(&self) -> usize {
        2
    }

    fn read_file(&self, file: &VirtualFile, _opts: &ReadOptions) -> Result<Segments, Error> {
        let content = read_to_string(file.open_for_read()?)?;
        let records = parse_wmt_xml(&content, &file.name())?;
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}
