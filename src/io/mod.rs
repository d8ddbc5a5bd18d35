/*!
# IO utilities

Opening and creating (possibly gzipped) text files, and writing aligned per-language files.
!*/
mod langfiles;
pub mod textio;

pub use langfiles::{lang_path, meta_path, LangFiles};
pub use textio::{create_text, open_text, Codec, LossyLines, TextReader, TextWriter};
