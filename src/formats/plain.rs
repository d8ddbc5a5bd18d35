//! Line-oriented plain text: one segment per line.
use crate::cache::VirtualFile;
use crate::error::Error;
use crate::io::LossyLines;

use super::{FormatReader, ReadOptions, Record, Segments};

pub struct PlainReader;

impl FormatReader for PlainReader {
    fn columns(&self) -> usize {
        1
    }

    fn read_file(&self, file: &VirtualFile, _opts: &ReadOptions) -> Result<Segments, Error> {
        let lines = LossyLines::new(file.open_for_read()?);
        Ok(Box::new(lines.map(|line| {
            line.map(|line| Record::new(vec![line.trim().to_string()]))
        })))
    }
}
