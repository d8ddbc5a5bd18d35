//! Tab separated columns.
//!
//! Quotes carry no meaning (corpora routinely contain unbalanced `"`), and rows may have
//! differing column counts. Column selection happens later, see [super::read_segments].
use csv::{ByteRecord, ReaderBuilder};

use crate::cache::VirtualFile;
use crate::error::Error;

use super::{FormatReader, ReadOptions, Record, Segments};

pub struct TsvReader;

fn to_record(row: ByteRecord) -> Record {
    Record::new(
        row.iter()
            .map(|cell| String::from_utf8_lossy(cell).trim().to_string())
            .collect(),
    )
}

impl FormatReader for TsvReader {
    fn columns(&self) -> usize {
        2
    }

    fn read_file(&self, file: &VirtualFile, _opts: &ReadOptions) -> Result<Segments, Error> {
        let reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .quoting(false)
            .flexible(true)
            .from_reader(file.open_for_read()?);
        Ok(Box::new(
            reader
                .into_byte_records()
                .map(|row| row.map(to_record).map_err(Error::from)),
        ))
    }
}
