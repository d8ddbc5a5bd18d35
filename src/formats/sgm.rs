/*! Legacy WMT SGML test sets.

These files are not reliably well-formed (unescaped `&` are common), so they are scanned line by
line with regular expressions rather than parsed as XML.
Each `<seg ...>text</seg>` line yields one segment, tagged with the current `docid`.
!*/
use lazy_static::lazy_static;
use log::info;
use regex::Regex;

use crate::cache::VirtualFile;
use crate::error::Error;
use crate::io::LossyLines;

use super::{clean_text, FormatReader, ReadOptions, Record, Segments};

lazy_static! {
    static ref SEG: Regex = Regex::new(r"<seg[^>]*>(.*)</seg>").unwrap();
    static ref DOC: Regex = Regex::new(r#"<doc\s[^>]*\bdocid="([^"]*)""#).unwrap();
}

pub struct SgmReader;

struct SgmRecords {
    name: String,
    lines: LossyLines,
    docid: Option<String>,
    count: usize,
}

impl Iterator for SgmRecords {
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        for line in self.lines.by_ref() {
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            if let Some(caps) = DOC.captures(&line) {
                self.docid = Some(caps[1].to_string());
            }
            if let Some(caps) = SEG.captures(&line) {
                self.count += 1;
                let mut record = Record::new(vec![clean_text(&caps[1])]);
                if let Some(docid) = &self.docid {
                    record = record.with_meta("docid", docid);
                }
                return Some(Ok(record));
            }
        }
        if self.count > 0 {
            info!("read {} segments from {}", self.count, self.name);
            self.count = 0;
        }
        None
    }
}

impl FormatReader for SgmReader {
    fn columns(&self) -> usize {
        1
    }

    fn read_file(&self, file: &VirtualFile, _opts: &ReadOptions) -> Result<Segments, Error> {
        Ok(Box::new(SgmRecords {
            name: file.name(),
            lines: LossyLines::new(file.open_for_read()?),
            docid: None,
            count: 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::io::textio::wrap_reader;

    #[test]
    fn test_tolerant_scan() {
        let sgm = r#"<srcset setid="newstest2019" srclang="any">
<doc sysid="ref" docid="abc-123" genreid="news" origlang="de">
<p>
<seg id="1">Tom &amp; Jerry   are here</seg>
<seg id="2">AT&T is unescaped</seg>
</p>
</doc>
</srcset>"#;
        let records: Vec<Record> = SgmRecords {
            name: "test.sgm".to_string(),
            lines: LossyLines::new(wrap_reader(Cursor::new(sgm.as_bytes().to_vec()), "test.sgm")),
            docid: None,
            count: 0,
        }
        .collect::<Result<_, _>>()
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].segments, vec!["Tom & Jerry are here"]);
        assert_eq!(records[1].segments, vec!["AT&T is unescaped"]);
        assert_eq!(records[1].meta.as_ref().unwrap()["docid"], "abc-123");
    }
}
